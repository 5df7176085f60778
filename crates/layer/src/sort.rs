/// One entry of a bucket sort: the order key of a body and where it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortItem {
    pub key: u32,
    pub index: u32,
}

impl SortItem {
    pub fn new(xmin: f32, index: u32) -> Self {
        Self {
            key: sort_key(xmin),
            index,
        }
    }
}

/// Map a float onto a `u32` whose unsigned order matches the float order.
///
/// Negative values have all bits flipped, non-negative values only the sign
/// bit, so `-0.0` sorts just before `0.0`.
pub fn sort_key(value: f32) -> u32 {
    let bits = value.to_bits();
    let mask = if bits & 0x8000_0000 != 0 {
        u32::MAX
    } else {
        0x8000_0000
    };
    bits ^ mask
}

/// Stable LSD radix sort over the four key bytes.
///
/// Passes where every key shares the same byte are skipped.
pub fn radix_sort(items: &mut [SortItem]) {
    if items.len() < 2 {
        return;
    }

    let mut counts = [[0usize; 256]; 4];
    for item in items.iter() {
        for (pass, count) in counts.iter_mut().enumerate() {
            count[byte(item.key, pass)] += 1;
        }
    }

    let mut scratch = vec![SortItem::default(); items.len()];
    let mut in_scratch = false;
    for (pass, count) in counts.iter().enumerate() {
        if count.iter().any(|&c| c == items.len()) {
            continue;
        }

        let mut offsets = [0usize; 256];
        let mut running = 0;
        for (offset, &c) in offsets.iter_mut().zip(count.iter()) {
            *offset = running;
            running += c;
        }

        let (src, dst) = if in_scratch {
            (&scratch[..], &mut items[..])
        } else {
            (&items[..], &mut scratch[..])
        };
        for item in src {
            let slot = &mut offsets[byte(item.key, pass)];
            dst[*slot] = *item;
            *slot += 1;
        }
        in_scratch = !in_scratch;
    }

    if in_scratch {
        items.copy_from_slice(&scratch);
    }
}

fn byte(key: u32, pass: usize) -> usize {
    ((key >> (pass * 8)) & 0xff) as usize
}

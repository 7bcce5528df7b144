//! Minimal HID report descriptor walker
//!
//! Only the top-level collection's usage page and usage are needed for
//! enumeration, so this stops as soon as both have been seen.

/// Item prefix with the size bits masked off
const ITEM_USAGE_PAGE: u8 = 0x04;
const ITEM_USAGE: u8 = 0x08;
const LONG_ITEM: u8 = 0xFE;

/// Extract `(usage_page, usage)` of the first top-level collection
///
/// Missing values come back as 0. Truncated descriptors are tolerated.
pub fn top_level_usage(desc: &[u8]) -> (u16, u16) {
    let mut usage_page = None;
    let mut usage = None;
    let mut i = 0;

    while i < desc.len() {
        let key = desc[i];

        if key == LONG_ITEM {
            // bDataSize, bLongItemTag, data
            let size = desc.get(i + 1).copied().unwrap_or(0) as usize;
            i += 3 + size;
            continue;
        }

        let size = match key & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let data = desc.get(i + 1..i + 1 + size).unwrap_or(&[]);
        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);

        match key & 0xFC {
            ITEM_USAGE_PAGE if usage_page.is_none() => usage_page = Some(value as u16),
            ITEM_USAGE if usage.is_none() => usage = Some(value as u16),
            _ => {}
        }

        if usage_page.is_some() && usage.is_some() {
            break;
        }
        i += 1 + size;
    }

    (usage_page.unwrap_or(0), usage.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyboard_descriptor() {
        // Usage Page (Generic Desktop), Usage (Keyboard), Collection (Application)
        let desc = [0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x05, 0x07, 0x19, 0xE0];
        assert_eq!(top_level_usage(&desc), (0x0001, 0x0006));
    }

    #[test]
    fn test_vendor_two_byte_page() {
        let desc = [0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01];
        assert_eq!(top_level_usage(&desc), (0xFF00, 0x0001));
    }

    #[test]
    fn test_skips_long_items() {
        let desc = [0xFE, 0x02, 0x10, 0xAA, 0xBB, 0x05, 0x0C, 0x09, 0x01];
        assert_eq!(top_level_usage(&desc), (0x000C, 0x0001));
    }

    #[test]
    fn test_truncated_descriptor() {
        assert_eq!(top_level_usage(&[0x06, 0x00]), (0x0000, 0x0000));
        assert_eq!(top_level_usage(&[]), (0, 0));
    }

    #[test]
    fn test_first_values_win() {
        let desc = [0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x05, 0x09, 0x09, 0x01];
        assert_eq!(top_level_usage(&desc), (0x0001, 0x0002));
    }
}

//! Report transfer engine
//!
//! Every report starts with its report ID byte (0x00 for devices without
//! numbered reports). Adapters move raw buffers; the rules on buffer sizing,
//! truncation and timeouts are enforced here.

use std::time::{Duration, Instant};

use hidport_transport::StringQuery;
use tracing::debug;

use crate::device::DeviceHandle;
use crate::error::{HidError, Result};

/// Shorten `s` to at most `max_units` UTF-16 code units on a char boundary
pub(crate) fn truncate_utf16(mut s: String, max_units: usize) -> String {
    let mut units = 0;
    for (idx, ch) in s.char_indices() {
        units += ch.len_utf16();
        if units > max_units {
            s.truncate(idx);
            break;
        }
    }
    s
}

/// Milliseconds left until `deadline`, rounded up
fn remaining_ms(deadline: Instant) -> i32 {
    let left = deadline.saturating_duration_since(Instant::now());
    let ms = left.as_micros().div_ceil(1000);
    i32::try_from(ms).unwrap_or(i32::MAX)
}

impl DeviceHandle {
    /// Read one input report, honoring the handle's nonblocking flag
    ///
    /// Blocking reads wait until a report arrives, the device fails, or the
    /// handle is closed from another thread (which yields `InvalidHandle`).
    pub fn read(&self, max_length: usize) -> Result<Vec<u8>> {
        let timeout_ms = if self.is_nonblocking() { 0 } else { -1 };
        self.read_timeout(max_length, timeout_ms)
    }

    /// Read one input report, waiting at most `timeout_ms`
    ///
    /// `-1` (or any negative value) waits forever, `0` polls once. An empty
    /// vector means no report arrived in time.
    pub fn read_timeout(&self, max_length: usize, timeout_ms: i32) -> Result<Vec<u8>> {
        if max_length == 0 {
            self.ensure_open()?;
            return Ok(Vec::new());
        }

        let slice_ms = self.read_slice_ms();
        let deadline = (timeout_ms > 0)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms as u64));
        let mut buf = vec![0u8; max_length];

        loop {
            let wait_ms = match deadline {
                _ if timeout_ms == 0 => 0,
                Some(deadline) => remaining_ms(deadline).min(slice_ms),
                None => slice_ms,
            };
            if timeout_ms > 0 && wait_ms == 0 {
                return Ok(Vec::new());
            }

            // Lock is held for one slice only so close() can get in between
            let n = self.transfer(HidError::ReadError, |dev| dev.read_timeout(&mut buf, wait_ms))?;
            if n > 0 {
                buf.truncate(n.min(max_length));
                debug!("{}: read {} bytes: {:02X?}", self.label(), n, buf);
                return Ok(buf);
            }
            if timeout_ms == 0 {
                return Ok(Vec::new());
            }
        }
    }

    /// Send an output report; `report[0]` is the report ID
    pub fn write(&self, report: &[u8]) -> Result<usize> {
        if report.is_empty() {
            self.ensure_open()?;
            return Err(self.fail(
                HidError::WriteError("report must start with a report ID".into()),
                None,
            ));
        }
        debug!("{}: write {:02X?}", self.label(), report);
        self.transfer(HidError::WriteError, |dev| dev.write(report))
    }

    /// Fetch feature report `report_id`; the result starts with the report ID
    pub fn get_feature_report(&self, report_id: u8, max_length: usize) -> Result<Vec<u8>> {
        if max_length == 0 {
            self.ensure_open()?;
            return Err(self.fail(
                HidError::FeatureReportError("buffer has no room for the report ID".into()),
                None,
            ));
        }

        let mut buf = vec![0u8; max_length];
        buf[0] = report_id;
        let n = self.transfer(HidError::FeatureReportError, |dev| {
            dev.get_feature_report(&mut buf)
        })?;
        buf.truncate(n.min(max_length));
        debug!(
            "{}: feature report 0x{:02X}: {:02X?}",
            self.label(),
            report_id,
            buf
        );
        Ok(buf)
    }

    /// Send a feature report; `report[0]` is the report ID
    pub fn send_feature_report(&self, report: &[u8]) -> Result<usize> {
        if report.is_empty() {
            self.ensure_open()?;
            return Err(self.fail(
                HidError::FeatureReportError("report must start with a report ID".into()),
                None,
            ));
        }
        debug!("{}: send feature {:02X?}", self.label(), report);
        self.transfer(HidError::FeatureReportError, |dev| {
            dev.send_feature_report(report)
        })
    }

    pub fn get_manufacturer_string(&self) -> Result<String> {
        self.query_string(StringQuery::Manufacturer)
    }

    pub fn get_product_string(&self) -> Result<String> {
        self.query_string(StringQuery::Product)
    }

    pub fn get_serial_number_string(&self) -> Result<String> {
        self.query_string(StringQuery::SerialNumber)
    }

    /// Fetch the USB string descriptor at `index`
    pub fn get_indexed_string(&self, index: i32) -> Result<String> {
        self.query_string(StringQuery::Indexed(index))
    }

    fn query_string(&self, query: StringQuery) -> Result<String> {
        // One slot of the buffer is the terminator
        let max_units = self.string_capacity().saturating_sub(1);
        self.transfer(HidError::StringQueryError, |dev| dev.get_string(query))
            .map(|s| truncate_utf16(s, max_units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_utf16_short_string_unchanged() {
        assert_eq!(truncate_utf16("Keyboard".into(), 255), "Keyboard");
        assert_eq!(truncate_utf16(String::new(), 0), "");
    }

    #[test]
    fn test_truncate_utf16_counts_code_units() {
        assert_eq!(truncate_utf16("abcdef".into(), 3), "abc");
        // é is one UTF-16 unit but two UTF-8 bytes
        assert_eq!(truncate_utf16("ééé".into(), 2), "éé");
    }

    #[test]
    fn test_truncate_utf16_keeps_surrogate_pairs_whole() {
        // 🎹 needs a surrogate pair
        assert_eq!(truncate_utf16("a🎹".into(), 2), "a");
        assert_eq!(truncate_utf16("a🎹".into(), 3), "a🎹");
    }

    #[test]
    fn test_remaining_ms_rounds_up() {
        let deadline = Instant::now() + Duration::from_micros(1500);
        let ms = remaining_ms(deadline);
        assert!((1..=2).contains(&ms));
        assert_eq!(remaining_ms(Instant::now()), 0);
    }
}

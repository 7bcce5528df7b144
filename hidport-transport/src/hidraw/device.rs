//! Open `/dev/hidrawN` session

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;

use tracing::debug;

use crate::error::TransportError;
use crate::types::{RawDeviceInfo, StringQuery};
use crate::RawDevice;

// HIDRAW ioctl definitions, from linux/hidraw.h:
// #define HIDIOCSFEATURE(len) _IOC(_IOC_WRITE|_IOC_READ, 'H', 0x06, len)
// #define HIDIOCGFEATURE(len) _IOC(_IOC_WRITE|_IOC_READ, 'H', 0x07, len)
const HIDRAW_MAGIC: u8 = b'H';

/// Largest length the 14-bit ioctl size field can carry
const IOC_SIZE_MAX: usize = 0x3FFF;

fn hidraw_ioc(nr: u32, len: usize) -> Result<libc::c_ulong, TransportError> {
    if len > IOC_SIZE_MAX {
        return Err(TransportError::Unsupported(format!(
            "feature report of {len} bytes exceeds hidraw limit of {IOC_SIZE_MAX}"
        )));
    }
    // Direction: 2 bits at 30-31, Size: 14 bits at 16-29, Type: 8 bits at 8-15, Nr: 8 bits at 0-7
    let dir: u32 = 3; // _IOC_WRITE | _IOC_READ
    let size = len as u32;
    Ok(((dir << 30) | (size << 16) | ((HIDRAW_MAGIC as u32) << 8) | nr) as libc::c_ulong)
}

pub(crate) fn hidiocsfeature(len: usize) -> Result<libc::c_ulong, TransportError> {
    hidraw_ioc(0x06, len)
}

pub(crate) fn hidiocgfeature(len: usize) -> Result<libc::c_ulong, TransportError> {
    hidraw_ioc(0x07, len)
}

/// A hidraw node opened read/write
pub struct HidrawDevice {
    file: File,
    info: RawDeviceInfo,
    last_error: Option<String>,
}

impl HidrawDevice {
    pub fn open(info: RawDeviceInfo) -> Result<Self, TransportError> {
        let path = String::from_utf8_lossy(&info.path).into_owned();
        let file = File::options()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(TransportError::from_os)?;
        debug!("Opened {}", path);
        Ok(Self {
            file,
            info,
            last_error: None,
        })
    }

    fn record<T>(&mut self, result: Result<T, TransportError>) -> Result<T, TransportError> {
        if let Err(e) = &result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn poll_readable(&self, timeout_ms: i32) -> Result<bool, TransportError> {
        let mut pfd = libc::pollfd {
            fd: self.file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(TransportError::from_os(err));
        }
        if ret == 0 {
            return Ok(false);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(TransportError::Disconnected);
        }
        Ok(true)
    }

    fn feature_ioctl(
        &self,
        request: libc::c_ulong,
        buf: *mut u8,
    ) -> Result<usize, TransportError> {
        let ret = unsafe { libc::ioctl(self.file.as_raw_fd(), request, buf) };
        if ret < 0 {
            return Err(TransportError::from_os(std::io::Error::last_os_error()));
        }
        Ok(ret as usize)
    }
}

impl RawDevice for HidrawDevice {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, TransportError> {
        let result = match self.poll_readable(timeout_ms) {
            Ok(true) => match self.file.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(TransportError::from_os(e)),
            },
            Ok(false) => Ok(0),
            Err(e) => Err(e),
        };
        self.record(result)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let result = self.file.write(data).map_err(TransportError::from_os);
        self.record(result)
    }

    fn get_feature_report(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let result = hidiocgfeature(buf.len())
            .and_then(|request| self.feature_ioctl(request, buf.as_mut_ptr()));
        self.record(result)
    }

    fn send_feature_report(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        // The ioctl takes a mutable pointer even for SET
        let mut buf = data.to_vec();
        let result = hidiocsfeature(buf.len())
            .and_then(|request| self.feature_ioctl(request, buf.as_mut_ptr()));
        self.record(result)
    }

    fn set_nonblocking(&mut self, _nonblocking: bool) -> Result<(), TransportError> {
        // Reads always go through poll(), so there is no fd flag to flip
        Ok(())
    }

    fn get_string(&mut self, query: StringQuery) -> Result<String, TransportError> {
        let result = match query {
            StringQuery::Manufacturer => Ok(self.info.manufacturer_string.clone()),
            StringQuery::Product => Ok(self.info.product_string.clone()),
            StringQuery::SerialNumber => Ok(self.info.serial_number.clone()),
            StringQuery::Indexed(index) => Err(TransportError::Unsupported(format!(
                "string index {index} is not readable through hidraw"
            ))),
        }
        .map(Option::unwrap_or_default);
        self.record(result)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ioctl_numbers() {
        // Same values as the kernel macros for a 65-byte report
        assert_eq!(hidiocgfeature(65).unwrap(), 0xC0414807);
        assert_eq!(hidiocsfeature(65).unwrap(), 0xC0414806);
        assert_eq!(hidiocgfeature(0x3FFF).unwrap(), 0xFFFF4807);
    }

    #[test]
    fn test_oversized_feature_report_rejected() {
        assert!(matches!(
            hidiocgfeature(0x4000),
            Err(TransportError::Unsupported(_))
        ));
        assert!(matches!(
            hidiocsfeature(16385),
            Err(TransportError::Unsupported(_))
        ));
    }
}

//! USB Gadget Adapter: a single composite `hid.usb0` function under configfs
//! carrying all three report IDs, per the resolved single-gadget-layout
//! decision recorded in the design ledger.
//!
//! Grounded on `otg/configfs.rs` (raw sysfs file helpers), `otg/manager.rs`
//! (gadget directory lifecycle, strings, MaxPower, UDC bind/unbind), and
//! `hid/otg.rs` (`write_with_timeout`'s poll-before-write pattern and its
//! errno-to-error mapping, adapted to the new `AppError` taxonomy).

use std::fs::{self, File, OpenOptions};
use std::io::Write as _;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::report::codec::frame_with_report_id;
use crate::report::descriptor;

use super::Transport;

const CONFIGFS_PATH: &str = "/sys/kernel/config/usb_gadget";
const USB_VENDOR_ID: u16 = 0x28de;
const USB_PRODUCT_ID: u16 = 0x1205;
const USB_BCD_DEVICE: u16 = 0x0100;
const USB_BCD_USB: u16 = 0x0200;

/// Per-`poll()` wait before checking the overall write budget again.
const WRITE_POLL_TIMEOUT_MS: u16 = 50;
/// Total time a single report write may spend retrying a short write
/// before giving up, per §4.5's "retried until completion or EPIPE/ESHUTDOWN".
const WRITE_BUDGET: Duration = Duration::from_millis(500);

fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .or_else(|e| if path.exists() { Err(e) } else { File::create(path) })
        .map_err(|e| AppError::Internal(format!("open {}: {e}", path.display())))?;
    let mut data = content.as_bytes().to_vec();
    if !content.ends_with('\n') {
        data.push(b'\n');
    }
    file.write_all(&data)
        .map_err(|e| AppError::Internal(format!("write {}: {e}", path.display())))?;
    file.flush()
        .map_err(|e| AppError::Internal(format!("flush {}: {e}", path.display())))
}

fn write_bytes(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|e| AppError::Internal(format!("create {}: {e}", path.display())))?;
    file.write_all(data)
        .map_err(|e| AppError::Internal(format!("write {}: {e}", path.display())))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| AppError::Internal(format!("mkdir {}: {e}", path.display())))
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir(path)
            .map_err(|e| AppError::Internal(format!("rmdir {}: {e}", path.display())))?;
    }
    Ok(())
}

fn remove_file(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)
            .map_err(|e| AppError::Internal(format!("rm {}: {e}", path.display())))?;
    }
    Ok(())
}

fn create_symlink(src: &Path, dest: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dest)
        .map_err(|e| AppError::Internal(format!("symlink {} -> {}: {e}", dest.display(), src.display())))
}

fn find_udc() -> Option<String> {
    fs::read_dir("/sys/class/udc")
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .next()
}

/// USB HID gadget: one composite function, one config, bound to the first
/// available UDC.
pub struct UsbGadget {
    gadget_name: String,
    gadget_path: PathBuf,
    config_path: PathBuf,
    function_path: PathBuf,
    device_path: PathBuf,
    device: Mutex<Option<File>>,
    created_by_us: bool,
    bound: bool,
}

impl UsbGadget {
    pub fn new(gadget_name: impl Into<String>) -> Self {
        let gadget_name = gadget_name.into();
        let gadget_path = PathBuf::from(CONFIGFS_PATH).join(&gadget_name);
        let config_path = gadget_path.join("configs/c.1");
        let function_path = gadget_path.join("functions/hid.usb0");
        Self {
            gadget_name,
            gadget_path,
            config_path,
            function_path,
            device_path: PathBuf::from("/dev/hidg0"),
            device: Mutex::new(None),
            created_by_us: false,
            bound: false,
        }
    }

    fn is_configfs_available() -> bool {
        Path::new(CONFIGFS_PATH).exists()
    }

    fn setup(&mut self) -> Result<()> {
        if !Self::is_configfs_available() {
            return Err(AppError::ConfigfsNotMounted);
        }
        if self.gadget_path.exists() {
            return Err(AppError::GadgetAlreadyExists(self.gadget_name.clone()));
        }

        create_dir(&self.gadget_path)?;
        self.created_by_us = true;

        write_file(&self.gadget_path.join("idVendor"), &format!("0x{:04x}", USB_VENDOR_ID))?;
        write_file(&self.gadget_path.join("idProduct"), &format!("0x{:04x}", USB_PRODUCT_ID))?;
        write_file(&self.gadget_path.join("bcdDevice"), &format!("0x{:04x}", USB_BCD_DEVICE))?;
        write_file(&self.gadget_path.join("bcdUSB"), &format!("0x{:04x}", USB_BCD_USB))?;
        write_file(&self.gadget_path.join("bDeviceClass"), "0x00")?;
        write_file(&self.gadget_path.join("bDeviceSubClass"), "0x00")?;
        write_file(&self.gadget_path.join("bDeviceProtocol"), "0x00")?;

        let strings_path = self.gadget_path.join("strings/0x409");
        create_dir(&strings_path)?;
        write_file(&strings_path.join("serialnumber"), "0123456789")?;
        write_file(&strings_path.join("manufacturer"), "hidctl")?;
        write_file(&strings_path.join("product"), "Handheld HID Peripheral")?;

        create_dir(&self.config_path)?;
        let config_strings = self.config_path.join("strings/0x409");
        create_dir(&config_strings)?;
        write_file(&config_strings.join("configuration"), "HID")?;
        write_file(&self.config_path.join("MaxPower"), "250")?;

        create_dir(&self.function_path)?;
        write_file(&self.function_path.join("protocol"), "0")?;
        write_file(&self.function_path.join("subclass"), "0")?;
        write_file(
            &self.function_path.join("report_length"),
            &descriptor::MAX_REPORT_LEN_WITH_ID.to_string(),
        )?;
        write_bytes(&self.function_path.join("report_desc"), &descriptor::bytes())?;

        let link_path = self.config_path.join("hid.usb0");
        if !link_path.exists() {
            create_symlink(&self.function_path, &link_path)?;
        }

        debug!("USB gadget '{}' configured", self.gadget_name);
        Ok(())
    }

    fn bind(&mut self) -> Result<()> {
        let udc = find_udc().ok_or(AppError::NoUdcAvailable)?;
        info!("binding gadget '{}' to UDC {}", self.gadget_name, udc);
        write_file(&self.gadget_path.join("UDC"), &udc)?;
        self.bound = true;
        Ok(())
    }

    fn unbind_best_effort(&mut self) {
        if self.bound {
            let _ = write_file(&self.gadget_path.join("UDC"), "");
            self.bound = false;
        }
    }

    fn teardown_best_effort(&mut self) {
        self.unbind_best_effort();
        let _ = remove_file(&self.config_path.join("hid.usb0"));
        let _ = remove_dir(&self.config_path.join("strings/0x409"));
        let _ = remove_dir(&self.config_path);
        let _ = remove_dir(&self.function_path);
        let _ = remove_dir(&self.gadget_path.join("strings/0x409"));
        let _ = remove_dir(&self.gadget_path);
        self.created_by_us = false;
    }

    fn ensure_open(&self) -> Result<()> {
        let mut dev = self.device.lock();
        if dev.is_none() {
            if !self.device_path.exists() {
                return Err(AppError::DeviceGone(self.device_path.display().to_string()));
            }
            let file = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.device_path)
                .map_err(|e| AppError::Internal(format!("open {}: {e}", self.device_path.display())))?;
            *dev = Some(file);
        }
        Ok(())
    }

    /// Polls for writability up to `timeout_ms`. Returns `Ok(true)` once
    /// `data` has been written, `Ok(false)` on a poll timeout (caller should
    /// retry while budget remains), `Err` on a device error/hangup or a
    /// completed write that itself failed.
    fn write_with_timeout(file: &mut File, data: &[u8], timeout_ms: u16) -> std::io::Result<bool> {
        let mut pollfd = [PollFd::new(file.as_fd(), PollFlags::POLLOUT)];
        match poll(&mut pollfd, PollTimeout::from(timeout_ms)) {
            Ok(n) if n > 0 => {
                if let Some(revents) = pollfd[0].revents() {
                    if revents.contains(PollFlags::POLLERR) || revents.contains(PollFlags::POLLHUP) {
                        return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "device error or hangup"));
                    }
                }
                file.write_all(data)?;
                Ok(true)
            }
            Ok(_) => Ok(false),
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

#[async_trait]
impl Transport for UsbGadget {
    async fn start(&mut self) -> Result<()> {
        self.setup()?;
        self.bind()?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        *self.device.lock() = None;
        if self.created_by_us {
            self.teardown_best_effort();
        }
        Ok(())
    }

    async fn push(&self, report_id: u8, payload: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let frame = frame_with_report_id(report_id, payload);
        let deadline = Instant::now() + WRITE_BUDGET;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(AppError::Internal(format!(
                    "hidg write timed out after {}ms",
                    WRITE_BUDGET.as_millis()
                )));
            }
            let poll_timeout_ms = remaining
                .as_millis()
                .min(WRITE_POLL_TIMEOUT_MS as u128) as u16;

            let mut dev = self.device.lock();
            let file = dev.as_mut().expect("ensure_open just populated this");
            match Self::write_with_timeout(file, &frame, poll_timeout_ms) {
                Ok(true) => return Ok(()),
                Ok(false) => continue,
                Err(e) => {
                    return match e.raw_os_error() {
                        Some(libc::EPIPE) | Some(libc::ESHUTDOWN) => {
                            *dev = None;
                            Err(AppError::HostDetached(e.to_string()))
                        }
                        Some(libc::EAGAIN) => Ok(()),
                        _ => {
                            *dev = None;
                            Err(AppError::Internal(format!("hidg write failed: {e}")))
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gadget_paths_derive_from_name() {
        let gadget = UsbGadget::new("hidctl0");
        assert_eq!(
            gadget.gadget_path,
            PathBuf::from("/sys/kernel/config/usb_gadget/hidctl0")
        );
        assert_eq!(
            gadget.function_path,
            PathBuf::from("/sys/kernel/config/usb_gadget/hidctl0/functions/hid.usb0")
        );
    }

    #[tokio::test]
    async fn push_to_missing_device_is_device_gone() {
        let gadget = UsbGadget::new("nonexistent-test-gadget");
        let err = gadget.push(descriptor::REPORT_ID_MOUSE, &[0; 7]).await;
        assert!(err.is_err());
    }
}

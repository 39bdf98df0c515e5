//! Linux i2c-dev backend
//!
//! Talks DDC/CI directly over `/dev/i2c-N` using the `I2C_SLAVE` ioctl.
//! Requires the `i2c-dev` kernel module and read/write access to the device
//! nodes (usually membership of the `i2c` group).

use crate::channel::{ChannelBackend, ChannelError, ChannelTarget, DdcChannel};
use crate::codec::{self, DDC_I2C_ADDRESS, EDID_I2C_ADDRESS, REPLY_LEN, VcpReply};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const I2C_SLAVE: u16 = 0x0703;

nix::ioctl_write_int_bad!(i2c_set_slave, I2C_SLAVE);

/// Time a display needs between a Get VCP request and its reply
const REPLY_DELAY: Duration = Duration::from_millis(40);

/// Opens channels on `/dev/i2c-N`
#[derive(Debug, Clone)]
pub struct I2cBackend {
    dev_dir: PathBuf,
}

impl I2cBackend {
    pub fn new(dev_dir: impl Into<PathBuf>) -> Self {
        Self {
            dev_dir: dev_dir.into(),
        }
    }

    /// Return a backend if any i2c device node is present
    pub fn detect() -> Option<Self> {
        let dev = Path::new("/dev");
        let entries = fs::read_dir(dev).ok()?;
        let found = entries
            .flatten()
            .any(|e| e.file_name().to_string_lossy().starts_with("i2c-"));
        if found {
            Some(Self::new(dev))
        } else {
            tracing::debug!("No /dev/i2c-* nodes, is i2c-dev loaded?");
            None
        }
    }

    fn device_path(&self, bus: u32) -> PathBuf {
        self.dev_dir.join(format!("i2c-{}", bus))
    }
}

impl ChannelBackend for I2cBackend {
    fn name(&self) -> &'static str {
        "i2c-dev"
    }

    fn open(&self, target: &ChannelTarget) -> Result<Box<dyn DdcChannel>, ChannelError> {
        let bus = target
            .i2c_bus
            .ok_or(ChannelError::Unavailable(target.display))?;
        let path = self.device_path(bus);
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        tracing::debug!("Opened {} for display {}", path.display(), target.display);
        Ok(Box::new(I2cChannel { file, bus }))
    }
}

/// One open `/dev/i2c-N` node
pub struct I2cChannel {
    file: File,
    bus: u32,
}

impl I2cChannel {
    fn select(&self, address: u16) -> Result<(), ChannelError> {
        // SAFETY: the fd is owned by `self.file` and stays open for the call
        unsafe { i2c_set_slave(self.file.as_raw_fd(), i32::from(address)) }?;
        Ok(())
    }
}

impl DdcChannel for I2cChannel {
    fn write_vcp(&mut self, code: u8, value: u16, source: u8) -> Result<(), ChannelError> {
        self.select(DDC_I2C_ADDRESS)?;
        let packet = codec::encode_write(source, code, value);
        self.file.write_all(&packet)?;
        tracing::trace!("i2c-{} wrote {:02x?}", self.bus, packet);
        Ok(())
    }

    fn read_vcp(&mut self, code: u8) -> Result<VcpReply, ChannelError> {
        self.select(DDC_I2C_ADDRESS)?;
        let request = codec::encode_read(codec::HOST_SOURCE, code);
        self.file.write_all(&request)?;

        thread::sleep(REPLY_DELAY);

        let mut reply = [0u8; REPLY_LEN];
        self.file.read_exact(&mut reply)?;
        tracing::trace!("i2c-{} read {:02x?}", self.bus, reply);
        Ok(codec::decode_reply(code, &reply)?)
    }

    fn read_edid(&mut self) -> Result<Vec<u8>, ChannelError> {
        self.select(EDID_I2C_ADDRESS)?;
        self.file.write_all(&[0x00])?;
        let mut edid = vec![0u8; 256];
        let read = self.file.read(&mut edid)?;
        edid.truncate(read);
        Ok(edid)
    }
}

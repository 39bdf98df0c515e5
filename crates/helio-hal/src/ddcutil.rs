//! `ddcutil` command-line backend
//!
//! Used when the process cannot open `/dev/i2c-*` itself but a `ddcutil`
//! binary is installed (it may be setuid or use its own udev rules).

use crate::channel::{ChannelBackend, ChannelError, ChannelTarget, DdcChannel};
use crate::codec::{HOST_SOURCE, VcpReply};
use regex::Regex;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

/// `--brief` getvcp output, e.g. `VCP 10 C 50 100` or `VCP 60 SNC x11`
static BRIEF_REPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^VCP\s+([0-9A-Fa-f]{2})\s+(C|SNC|CNC|T|ERR)\b\s*(.*)$")
        .expect("valid ddcutil reply pattern")
});

/// Shells out to `ddcutil`
#[derive(Debug, Clone)]
pub struct DdcutilBackend {
    program: PathBuf,
}

impl DdcutilBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Locate `ddcutil` on `PATH`
    pub fn detect() -> Option<Self> {
        match which::which("ddcutil") {
            Ok(path) => Some(Self::new(path)),
            Err(e) => {
                tracing::debug!("ddcutil not found: {}", e);
                None
            }
        }
    }
}

impl ChannelBackend for DdcutilBackend {
    fn name(&self) -> &'static str {
        "ddcutil"
    }

    fn open(&self, target: &ChannelTarget) -> Result<Box<dyn DdcChannel>, ChannelError> {
        let bus = target
            .i2c_bus
            .ok_or(ChannelError::Unavailable(target.display))?;
        Ok(Box::new(DdcutilChannel {
            program: self.program.clone(),
            bus,
        }))
    }
}

/// Channel that runs one `ddcutil` process per request
pub struct DdcutilChannel {
    program: PathBuf,
    bus: u32,
}

impl DdcutilChannel {
    fn run(&self, args: &[String]) -> Result<String, ChannelError> {
        let output = Command::new(&self.program)
            .args(args)
            .arg("--bus")
            .arg(self.bus.to_string())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ChannelError::Command(format!(
                "ddcutil {} exited with {}: {}",
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl DdcChannel for DdcutilChannel {
    fn write_vcp(&mut self, code: u8, value: u16, source: u8) -> Result<(), ChannelError> {
        if source != HOST_SOURCE {
            tracing::debug!(
                "ddcutil cannot change the source address, sending {:#04x} with the default",
                code
            );
        }
        self.run(&[
            "setvcp".to_string(),
            format!("{:#04x}", code),
            value.to_string(),
            "--noverify".to_string(),
        ])?;
        Ok(())
    }

    fn read_vcp(&mut self, code: u8) -> Result<VcpReply, ChannelError> {
        let stdout = self.run(&[
            "getvcp".to_string(),
            format!("{:#04x}", code),
            "--brief".to_string(),
        ])?;
        parse_brief(code, &stdout)
    }

    fn read_edid(&mut self) -> Result<Vec<u8>, ChannelError> {
        Err(ChannelError::Unsupported("ddcutil"))
    }
}

fn parse_hex_byte(token: &str) -> Option<u16> {
    let digits = token.trim_start_matches('x').trim_start_matches("0x");
    u16::from_str_radix(digits, 16).ok()
}

/// Parse `ddcutil getvcp --brief` output
pub fn parse_brief(code: u8, stdout: &str) -> Result<VcpReply, ChannelError> {
    let caps = BRIEF_REPLY
        .captures(stdout)
        .ok_or_else(|| ChannelError::Command(format!("unparseable ddcutil output: {}", stdout.trim())))?;

    let fields: Vec<&str> = caps[3].split_whitespace().collect();
    let malformed = || ChannelError::Command(format!("unexpected ddcutil reply: {}", &caps[0]));

    let (max, current) = match &caps[2] {
        "C" if fields.len() >= 2 => {
            let current = fields[0].parse::<u16>().map_err(|_| malformed())?;
            let max = fields[1].parse::<u16>().map_err(|_| malformed())?;
            (max, current)
        }
        "SNC" if !fields.is_empty() => (0, parse_hex_byte(fields[0]).ok_or_else(malformed)?),
        "CNC" if fields.len() >= 4 => {
            let bytes: Option<Vec<u16>> = fields[..4].iter().map(|f| parse_hex_byte(f)).collect();
            let bytes = bytes.ok_or_else(malformed)?;
            ((bytes[0] << 8) | bytes[1], (bytes[2] << 8) | bytes[3])
        }
        _ => return Err(malformed()),
    };

    Ok(VcpReply {
        code,
        kind: 0,
        max,
        current,
    })
}

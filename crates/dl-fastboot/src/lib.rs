//! Fastboot client: ASCII commands, 4-byte reply prefixes, and the
//! Huawei/Honor vendor layer on top of `oem`/`getvar`.

use std::time::{Duration, Instant};

use dl_port::{DeviceHandle, Endpoint, config};

use crate::err::Error;

pub mod err;
pub mod vendor;

pub use vendor::{HuaweiHonorDeviceInfo, VendorAdapter};

pub type Result<T> = core::result::Result<T, Error>;

/// Reply text after the 4-byte prefix is at most this long.
const REPLY_TEXT_MAX: usize = 60;

/// A reply is considered complete once the line has been quiet this long.
const DEFAULT_QUIET: Duration = Duration::from_millis(50);

/// Assumed floor for `download` throughput when scaling its budget.
const DOWNLOAD_FLOOR_BYTES_PER_SEC: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reply {
    Okay(String),
    Info(String),
    Data(u32),
    Fail(String),
}

pub struct FastbootClient {
    handle: DeviceHandle,
    timeout: Duration,
    quiet: Duration,
}

impl FastbootClient {
    #[must_use]
    pub fn new(handle: DeviceHandle) -> Self {
        Self {
            handle,
            timeout: config::CMD_TIMEOUT,
            quiet: DEFAULT_QUIET,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_quiet_window(&mut self, quiet: Duration) {
        self.quiet = quiet;
    }

    /// Reply text tail: the rest of the reply burst, up to 60 bytes. An
    /// OKAY with no text yields an empty tail once the quiet gap passes.
    fn read_tail(&self, ep: &mut Endpoint) -> Result<String> {
        let mut tmp = [0u8; REPLY_TEXT_MAX];
        let started = Instant::now();

        loop {
            let n = ep.read_some(&mut tmp)?;
            if n > 0 {
                return Ok(String::from_utf8_lossy(&tmp[..n])
                    .trim_end_matches('\0')
                    .to_string());
            }
            if started.elapsed() >= self.quiet {
                return Ok(String::new());
            }
        }
    }

    fn read_reply(&self, ep: &mut Endpoint, command: &str) -> Result<Reply> {
        self.read_reply_with(ep, command, self.timeout)
    }

    fn read_reply_with(
        &self,
        ep: &mut Endpoint,
        command: &str,
        timeout: Duration,
    ) -> Result<Reply> {
        let mut prefix = [0u8; 4];
        ep.read_exact("fastboot reply", &mut prefix, timeout)
            .map_err(|e| match e {
                dl_port::err::Error::Timeout { .. } => Error::Timeout {
                    command: command.to_string(),
                },
                other => other.into(),
            })?;

        let text = self.read_tail(ep)?;
        match &prefix {
            b"OKAY" => Ok(Reply::Okay(text)),
            b"INFO" => Ok(Reply::Info(text)),
            b"FAIL" => Ok(Reply::Fail(text)),
            b"DATA" => {
                let size = u32::from_str_radix(text.trim(), 16).map_err(|_| {
                    Error::UnexpectedReply {
                        command: command.to_string(),
                        prefix: format!("DATA{text}"),
                    }
                })?;
                Ok(Reply::Data(size))
            }
            other => Err(Error::UnexpectedReply {
                command: command.to_string(),
                prefix: String::from_utf8_lossy(other).to_string(),
            }),
        }
    }

    /// One prefix-framed command; INFO lines are accumulated in front
    /// of the terminal OKAY text.
    pub fn command(&self, command: &str) -> Result<String> {
        let mut ep = self.handle.lock();
        ep.write_all(command.as_bytes())?;

        let mut info = Vec::new();
        loop {
            match self.read_reply(&mut ep, command)? {
                Reply::Info(line) => info.push(line),
                Reply::Okay(text) => {
                    if !text.is_empty() {
                        info.push(text);
                    }
                    return Ok(info.join("\n"));
                }
                Reply::Fail(message) => {
                    return Err(Error::Fail {
                        command: command.to_string(),
                        message,
                    });
                }
                Reply::Data(_) => {
                    return Err(Error::UnexpectedReply {
                        command: command.to_string(),
                        prefix: "DATA".to_string(),
                    });
                }
            }
        }
    }

    pub fn get_var(&self, name: &str) -> Result<String> {
        self.command(&format!("getvar:{name}"))
    }

    /// Vendor OEM command. The reply is returned raw, bootloader
    /// prefixes and terminal token included, because the vendor layer's
    /// recognisers work on the whole transcript.
    pub fn oem(&self, line: &str) -> Result<String> {
        let command = format!("oem {line}");
        let mut ep = self.handle.lock();
        ep.write_all(command.as_bytes())?;

        let deadline = Instant::now() + self.timeout;
        let mut raw = Vec::new();
        let mut tmp = [0u8; 256];

        loop {
            let n = ep.read_some(&mut tmp)?;
            if n > 0 {
                raw.extend(&tmp[..n]);
                let text = String::from_utf8_lossy(&raw);
                if text.contains("OKAY") {
                    return Ok(text.trim_end_matches('\0').to_string());
                }
                if let Some(at) = text.find("FAIL") {
                    return Err(Error::Fail {
                        command,
                        message: text[at + 4..].trim_end_matches('\0').to_string(),
                    });
                }
            } else if Instant::now() >= deadline {
                return Err(Error::Timeout { command });
            }
        }
    }

    /// Stage `data` in the bootloader's download buffer.
    pub fn download(&self, data: &[u8]) -> Result<()> {
        let command = format!("download:{:08x}", data.len());
        let mut ep = self.handle.lock();
        ep.write_all(command.as_bytes())?;

        match self.read_reply(&mut ep, &command)? {
            Reply::Data(offered) if (offered as usize) >= data.len() => (),
            Reply::Data(offered) => {
                return Err(Error::DownloadRejected {
                    offered,
                    requested: data.len(),
                });
            }
            Reply::Fail(message) => return Err(Error::Fail { command, message }),
            other => {
                return Err(Error::UnexpectedReply {
                    command,
                    prefix: format!("{other:?}"),
                });
            }
        }

        ep.write_all(data)?;

        // Scale the terminal wait with the payload at the assumed
        // 1 MiB/s floor
        let budget = self
            .timeout
            .max(Duration::from_secs(1 + data.len() as u64 / DOWNLOAD_FLOOR_BYTES_PER_SEC));

        match self.read_reply_with(&mut ep, &command, budget)? {
            Reply::Okay(_) => Ok(()),
            Reply::Fail(message) => Err(Error::Fail { command, message }),
            other => Err(Error::UnexpectedReply {
                command,
                prefix: format!("{other:?}"),
            }),
        }
    }

    /// Pull the staged upload buffer from the device.
    pub fn upload(&self) -> Result<Vec<u8>> {
        let command = "upload";
        let mut ep = self.handle.lock();
        ep.write_all(command.as_bytes())?;

        let size = match self.read_reply(&mut ep, command)? {
            Reply::Data(size) => size,
            Reply::Fail(message) => {
                return Err(Error::Fail {
                    command: command.to_string(),
                    message,
                });
            }
            other => {
                return Err(Error::UnexpectedReply {
                    command: command.to_string(),
                    prefix: format!("{other:?}"),
                });
            }
        };

        let mut data = vec![0u8; size as usize];
        ep.read_exact("fastboot upload", &mut data, self.timeout)?;

        match self.read_reply(&mut ep, command)? {
            Reply::Okay(_) => Ok(data),
            Reply::Fail(message) => Err(Error::Fail {
                command: command.to_string(),
                message,
            }),
            other => Err(Error::UnexpectedReply {
                command: command.to_string(),
                prefix: format!("{other:?}"),
            }),
        }
    }
}

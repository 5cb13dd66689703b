//! Request decoding.
//!
//! ```text
//! ┌────────┬──────────────────┬────┬──────────────┐
//! │ byte 0 │ bytes 1..        │ \0 │ argument     │
//! │ cmd    │ service name     │    │ (optional)   │
//! └────────┴──────────────────┴────┴──────────────┘
//! ```
//! `h`, `l` and `L` take no name.

/// Command of a control request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `p`: pid and state.
    Pid,
    /// `r`: disable respawn.
    RespawnOff,
    /// `R`: enable respawn.
    RespawnOn,
    /// `c`: cancel; the next termination is not respawned.
    Cancel,
    /// `C`: reset a terminated service to its startable state.
    Clear,
    /// `P`: track an externally supplied pid.
    Adopt,
    /// `s`: load if needed and start.
    Start,
    /// `u`: seconds since the last transition.
    Uptime,
    /// `d`: services that depend on this one.
    Dependents,
    /// `h`: start history.
    History,
    /// `l`: service names.
    List,
    /// `L`: service names with state and uptime.
    ListLong,
}

impl Command {
    fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'p' => Command::Pid,
            b'r' => Command::RespawnOff,
            b'R' => Command::RespawnOn,
            b'c' => Command::Cancel,
            b'C' => Command::Clear,
            b'P' => Command::Adopt,
            b's' => Command::Start,
            b'u' => Command::Uptime,
            b'd' => Command::Dependents,
            b'h' => Command::History,
            b'l' => Command::List,
            b'L' => Command::ListLong,
            _ => return None,
        })
    }

    /// True for commands that address one service.
    pub fn needs_service(self) -> bool {
        !matches!(self, Command::History | Command::List | Command::ListLong)
    }
}

/// A decoded control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request<'a> {
    /// What to do.
    pub command: Command,
    /// Target service; empty for the listing commands.
    pub name: &'a str,
    /// Bytes after the first NUL, without trailing NULs.
    pub arg: Option<&'a [u8]>,
}

impl<'a> Request<'a> {
    /// Decodes one request. `None` for an unknown command, a non UTF-8 name,
    /// or a missing name where one is required.
    pub fn parse(raw: &'a [u8]) -> Option<Self> {
        let (&cmd, rest) = raw.split_first()?;
        let command = Command::from_byte(cmd)?;

        let (name, arg) = match rest.iter().position(|b| *b == 0) {
            Some(nul) => {
                let arg = trim_nuls(&rest[nul + 1..]);
                (&rest[..nul], (!arg.is_empty()).then_some(arg))
            }
            None => (rest, None),
        };
        let name = std::str::from_utf8(name).ok()?;
        if command.needs_service() && name.is_empty() {
            return None;
        }
        Some(Self { command, name, arg })
    }

    /// The argument as a decimal number.
    pub fn arg_number(&self) -> Option<i32> {
        std::str::from_utf8(self.arg?).ok()?.trim().parse().ok()
    }
}

fn trim_nuls(b: &[u8]) -> &[u8] {
    let end = b.iter().position(|c| *c == 0).unwrap_or(b.len());
    &b[..end]
}

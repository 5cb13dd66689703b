//! Response encoding.
//!
//! | response        | bytes                                  |
//! |-----------------|----------------------------------------|
//! | `Error`         | `0`                                    |
//! | `Ack`           | `1`                                    |
//! | `Pid`           | `<pid>@<state code>`                   |
//! | `Uptime`        | `<seconds>`                            |
//! | `List`          | `1:` then `entry\0` each, then `\0`    |
//!
//! An empty list is `1:\0\0`, so every list ends in a double NUL.

/// Typed answer to a control request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// Unknown service, bad request or refused operation.
    Error,
    /// Operation done.
    Ack,
    /// Pid (or sentinel) and numeric state.
    Pid {
        /// Live pid or status sentinel.
        pid: i32,
        /// State code.
        code: u8,
    },
    /// Seconds since the last transition.
    Uptime(u64),
    /// Multi-entry answer.
    List(Vec<String>),
}

impl Response {
    /// `Ack` on success, `Error` otherwise.
    pub fn ack_if(ok: bool) -> Self {
        if ok { Response::Ack } else { Response::Error }
    }

    /// Wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Error => b"0".to_vec(),
            Response::Ack => b"1".to_vec(),
            Response::Pid { pid, code } => format!("{pid}@{code}").into_bytes(),
            Response::Uptime(secs) => secs.to_string().into_bytes(),
            Response::List(entries) => {
                let len = entries.iter().map(|e| e.len() + 1).sum::<usize>();
                let mut out = Vec::with_capacity(len + 4);
                out.extend_from_slice(b"1:");
                for entry in entries {
                    out.extend_from_slice(entry.as_bytes());
                    out.push(0);
                }
                if entries.is_empty() {
                    out.push(0);
                }
                out.push(0);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_encodings() {
        assert_eq!(Response::Error.encode(), b"0");
        assert_eq!(Response::ack_if(true).encode(), b"1");
        assert_eq!(Response::Pid { pid: 412, code: 2 }.encode(), b"412@2");
        assert_eq!(Response::Pid { pid: -4, code: 6 }.encode(), b"-4@6");
        assert_eq!(Response::Uptime(93).encode(), b"93");
    }

    #[test]
    fn test_lists_end_in_double_nul() {
        let list = Response::List(vec!["a".into(), "net/dhcp".into()]);
        assert_eq!(list.encode(), b"1:a\0net/dhcp\0\0");
        assert_eq!(Response::List(Vec::new()).encode(), b"1:\0\0");
    }
}

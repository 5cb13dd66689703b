//! # Service directory declarations.
//!
//! A service is declared by the files in `<root>/<name>`:
//!
//! ```text
//! <root>/<name>/
//!   run        symlink (or file) to the program of the run phase
//!   setup      program of the one-shot setup phase
//!   respawn    marker: relaunch the run phase when it terminates
//!   sync       marker: the supervisor waits for the process to exit
//!   depends    service names, one per line (`#` comments and blanks ignored)
//!   params     argv entries after argv[0], one per line
//!   environ    KEY=VALUE lines added to the environment
//!   pidfile    first line names a file holding the real daemon pid
//!   log/       the attached log service
//! ```
//!
//! Every reader treats a missing file as "not declared". Other I/O errors
//! are propagated to the caller.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStringExt;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::error::EXIT_BAD_TARGET;

use super::service::Phase;

/// What the child does once its descriptors are wired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    /// Exec the program at this path.
    Exec(PathBuf),
    /// Exit immediately with this status.
    Exit(i32),
}

/// Read-only view of one service directory.
#[derive(Clone, Debug)]
pub(crate) struct ServiceDir {
    path: PathBuf,
}

impl ServiceDir {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// True if the entry exists, dangling symlinks included.
    pub(crate) fn has(&self, entry: &str) -> bool {
        fs::symlink_metadata(self.path.join(entry)).is_ok()
    }

    /// Names listed in `depends`.
    pub(crate) fn depends(&self) -> io::Result<Vec<String>> {
        let Some(raw) = self.read("depends")? else {
            return Ok(Vec::new());
        };
        Ok(String::from_utf8_lossy(&raw)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_owned)
            .collect())
    }

    /// Arguments listed in `params`, without argv[0].
    pub(crate) fn params(&self) -> io::Result<Vec<OsString>> {
        let Some(raw) = self.read("params")? else {
            return Ok(Vec::new());
        };
        Ok(split_lines(&raw)
            .map(|l| OsString::from_vec(l.to_vec()))
            .collect())
    }

    /// Variables listed in `environ`.
    pub(crate) fn environ(&self) -> io::Result<Vec<(OsString, OsString)>> {
        read_env_file(&self.path.join("environ"))
    }

    /// File named by the first line of `pidfile`, resolved against the service directory.
    pub(crate) fn pidfile(&self) -> Option<PathBuf> {
        let raw = self.read("pidfile").ok().flatten()?;
        let first = split_lines(&raw).next()?;
        let first = String::from_utf8_lossy(first);
        let first = first.trim();
        if first.is_empty() {
            return None;
        }
        Some(self.path.join(first))
    }

    /// Resolves the program of `phase`.
    ///
    /// A symlink yields its target (relative targets resolve against the
    /// service directory). A regular file is executed as is. A missing
    /// program yields a clean exit, anything else an exit with
    /// [`EXIT_BAD_TARGET`].
    pub(crate) fn target(&self, phase: Phase) -> Target {
        let entry = self.path.join(phase.program());
        match fs::read_link(&entry) {
            Ok(target) => Target::Exec(self.path.join(target)),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => Target::Exec(entry),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Target::Exit(0),
            Err(_) => Target::Exit(EXIT_BAD_TARGET),
        }
    }

    fn read(&self, file: &str) -> io::Result<Option<Vec<u8>>> {
        read_optional(&self.path.join(file))
    }
}

/// Reads `KEY=VALUE` lines; lines without `=` or with an empty key are skipped.
pub(crate) fn read_env_file(path: &Path) -> io::Result<Vec<(OsString, OsString)>> {
    let Some(raw) = read_optional(path)? else {
        return Ok(Vec::new());
    };
    Ok(split_lines(&raw).filter_map(parse_env_line).collect())
}

/// Reads the pid at the start of `path`. Only pids above 1 are accepted.
pub(crate) fn read_pid(path: &Path) -> Option<Pid> {
    let raw = fs::read(path).ok()?;
    let start = raw.iter().position(|b| !b.is_ascii_whitespace())?;
    let digits: &[u8] = &raw[start..];
    let end = digits
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(digits.len());
    let pid: i32 = std::str::from_utf8(&digits[..end]).ok()?.parse().ok()?;
    (pid > 1).then(|| Pid::from_raw(pid))
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Newline-separated entries; a trailing newline does not add an empty entry.
fn split_lines(raw: &[u8]) -> impl Iterator<Item = &[u8]> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let empty = raw.is_empty();
    raw.split(|b| *b == b'\n').filter(move |_| !empty)
}

fn parse_env_line(line: &[u8]) -> Option<(OsString, OsString)> {
    let eq = line.iter().position(|b| *b == b'=')?;
    if eq == 0 {
        return None;
    }
    Some((
        OsString::from_vec(line[..eq].to_vec()),
        OsString::from_vec(line[eq + 1..].to_vec()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn dir() -> (tempfile::TempDir, ServiceDir) {
        let tmp = tempfile::tempdir().unwrap();
        let sd = ServiceDir::new(tmp.path().to_path_buf());
        (tmp, sd)
    }

    #[test]
    fn test_missing_files_are_empty() {
        let (_tmp, sd) = dir();
        assert!(sd.exists());
        assert!(sd.depends().unwrap().is_empty());
        assert!(sd.params().unwrap().is_empty());
        assert!(sd.environ().unwrap().is_empty());
        assert_eq!(sd.pidfile(), None);
        assert_eq!(sd.target(Phase::Run), Target::Exit(0));
        assert!(!sd.has("respawn"));
    }

    #[test]
    fn test_depends_skips_comments_and_blanks() {
        let (tmp, sd) = dir();
        fs::write(tmp.path().join("depends"), "# network first\nnet\n\n  syslog  \n#x\n").unwrap();
        assert_eq!(sd.depends().unwrap(), vec!["net", "syslog"]);
    }

    #[test]
    fn test_params_keep_inner_empty_lines() {
        let (tmp, sd) = dir();
        fs::write(tmp.path().join("params"), "-c\n\nexit 0\n").unwrap();
        assert_eq!(
            sd.params().unwrap(),
            vec![OsString::from("-c"), OsString::new(), OsString::from("exit 0")]
        );
    }

    #[test]
    fn test_environ_parsing() {
        let (tmp, sd) = dir();
        fs::write(tmp.path().join("environ"), "A=1\nnoeq\n=x\nB=two=2\nC=\n").unwrap();
        let env = sd.environ().unwrap();
        assert_eq!(
            env,
            vec![
                (OsString::from("A"), OsString::from("1")),
                (OsString::from("B"), OsString::from("two=2")),
                (OsString::from("C"), OsString::new()),
            ]
        );
    }

    #[test]
    fn test_target_resolution() {
        let (tmp, sd) = dir();
        symlink("/bin/sh", tmp.path().join("run")).unwrap();
        assert_eq!(sd.target(Phase::Run), Target::Exec(PathBuf::from("/bin/sh")));

        symlink("helper", tmp.path().join("setup")).unwrap();
        assert_eq!(sd.target(Phase::Setup), Target::Exec(tmp.path().join("helper")));

        fs::remove_file(tmp.path().join("run")).unwrap();
        fs::write(tmp.path().join("run"), "#!/bin/sh\n").unwrap();
        assert_eq!(sd.target(Phase::Run), Target::Exec(tmp.path().join("run")));
    }

    #[test]
    fn test_pidfile_and_pid() {
        let (tmp, sd) = dir();
        fs::write(tmp.path().join("pidfile"), "daemon.pid\nignored\n").unwrap();
        assert_eq!(sd.pidfile(), Some(tmp.path().join("daemon.pid")));

        let pid = tmp.path().join("daemon.pid");
        fs::write(&pid, "  4242\n").unwrap();
        assert_eq!(read_pid(&pid), Some(Pid::from_raw(4242)));
        fs::write(&pid, "1\n").unwrap();
        assert_eq!(read_pid(&pid), None);
        fs::write(&pid, "garbage").unwrap();
        assert_eq!(read_pid(&pid), None);
        assert_eq!(read_pid(&tmp.path().join("absent")), None);
    }
}

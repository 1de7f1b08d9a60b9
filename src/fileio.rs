//! The open-file table behind `File` values. A `File` value is an
//! index into this table; the first three slots are the standard
//! streams. The permission mode from the command line (`-m`) gates
//! opening files for reading or writing.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

use crate::errors::CalcError;

pub const MODE_EXEC: u8 = 1;
pub const MODE_WRITE: u8 = 2;
pub const MODE_READ: u8 = 4;

pub enum FileEntry {
    Stdin,
    Stdout,
    Stderr,
    Read(BufReader<File>, String),
    Write(BufWriter<File>, String),
}

pub struct FileTable {
    entries: Vec<Option<FileEntry>>,
    access_mode: u8,
}

impl Default for FileTable {
    fn default() -> Self {
        FileTable {
            entries: vec![
                Some(FileEntry::Stdin),
                Some(FileEntry::Stdout),
                Some(FileEntry::Stderr),
            ],
            access_mode: MODE_READ | MODE_WRITE | MODE_EXEC,
        }
    }
}

impl FileTable {
    pub fn new() -> Self {
        FileTable::default()
    }

    pub fn set_access_mode(&mut self, mode: u8) {
        self.access_mode = mode & 7;
    }

    pub fn access_mode(&self) -> u8 {
        self.access_mode
    }

    /// Open a file; `mode` is "r", "w" or "a". Returns the new fid.
    pub fn open(&mut self, path: &str, mode: &str) -> Result<usize, CalcError> {
        let entry = match mode {
            "r" => {
                if self.access_mode & MODE_READ == 0 {
                    return Err(CalcError::FileMode);
                }
                let f = File::open(path).map_err(|_| CalcError::FileOpen(path.to_string()))?;
                FileEntry::Read(BufReader::new(f), path.to_string())
            }
            "w" | "a" => {
                if self.access_mode & MODE_WRITE == 0 {
                    return Err(CalcError::FileMode);
                }
                let f = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(mode == "w")
                    .append(mode == "a")
                    .open(path)
                    .map_err(|_| CalcError::FileOpen(path.to_string()))?;
                FileEntry::Write(BufWriter::new(f), path.to_string())
            }
            _ => return Err(CalcError::InvalidArg("fopen", mode.to_string())),
        };
        // reuse a closed slot when one exists
        for (i, slot) in self.entries.iter_mut().enumerate().skip(3) {
            if slot.is_none() {
                *slot = Some(entry);
                return Ok(i);
            }
        }
        self.entries.push(Some(entry));
        Ok(self.entries.len() - 1)
    }

    pub fn close(&mut self, fid: usize) -> Result<(), CalcError> {
        if fid < 3 {
            return Err(CalcError::InvalidArg("fclose", fid.to_string()));
        }
        match self.entries.get_mut(fid) {
            Some(slot) if slot.is_some() => {
                if let Some(FileEntry::Write(mut w, _)) = slot.take() {
                    let _ = w.flush();
                }
                Ok(())
            }
            _ => Err(CalcError::FileClosed),
        }
    }

    pub fn is_open(&self, fid: usize) -> bool {
        matches!(self.entries.get(fid), Some(Some(_)))
    }

    pub fn name(&self, fid: usize) -> Option<&str> {
        match self.entries.get(fid)? {
            Some(FileEntry::Stdin) => Some("(stdin)"),
            Some(FileEntry::Stdout) => Some("(stdout)"),
            Some(FileEntry::Stderr) => Some("(stderr)"),
            Some(FileEntry::Read(_, n)) | Some(FileEntry::Write(_, n)) => Some(n),
            None => None,
        }
    }

    /// Read one line including handling of a final unterminated line;
    /// `None` at end of file.
    pub fn read_line(&mut self, fid: usize) -> Result<Option<Vec<u8>>, CalcError> {
        match self.entries.get_mut(fid) {
            Some(Some(FileEntry::Read(r, _))) => {
                let mut buf = Vec::new();
                let n = r
                    .read_until(b'\n', &mut buf)
                    .map_err(|e| CalcError::IoFailed(e.to_string()))?;
                if n == 0 {
                    Ok(None)
                } else {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    Ok(Some(buf))
                }
            }
            Some(Some(FileEntry::Stdin)) => {
                let mut buf = Vec::new();
                let stdin = std::io::stdin();
                let n = stdin
                    .lock()
                    .read_until(b'\n', &mut buf)
                    .map_err(|e| CalcError::IoFailed(e.to_string()))?;
                if n == 0 {
                    Ok(None)
                } else {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                    }
                    Ok(Some(buf))
                }
            }
            Some(Some(_)) => Err(CalcError::InvalidArg("fgets", "write-only file".to_string())),
            _ => Err(CalcError::FileClosed),
        }
    }

    pub fn write_bytes(&mut self, fid: usize, bytes: &[u8]) -> Result<(), CalcError> {
        match self.entries.get_mut(fid) {
            Some(Some(FileEntry::Write(w, _))) => w
                .write_all(bytes)
                .map_err(|e| CalcError::IoFailed(e.to_string())),
            Some(Some(FileEntry::Stdout)) => std::io::stdout()
                .write_all(bytes)
                .map_err(|e| CalcError::IoFailed(e.to_string())),
            Some(Some(FileEntry::Stderr)) => std::io::stderr()
                .write_all(bytes)
                .map_err(|e| CalcError::IoFailed(e.to_string())),
            Some(Some(_)) => Err(CalcError::InvalidArg("fputs", "read-only file".to_string())),
            _ => Err(CalcError::FileClosed),
        }
    }

    pub fn flush(&mut self, fid: usize) -> Result<(), CalcError> {
        match self.entries.get_mut(fid) {
            Some(Some(FileEntry::Write(w, _))) => {
                w.flush().map_err(|e| CalcError::IoFailed(e.to_string()))
            }
            Some(Some(FileEntry::Stdout)) => std::io::stdout()
                .flush()
                .map_err(|e| CalcError::IoFailed(e.to_string())),
            Some(Some(_)) => Ok(()),
            _ => Err(CalcError::FileClosed),
        }
    }

    /// Read a whole file respecting the read permission bit; used for
    /// startup resource loading.
    pub fn read_source(&self, path: &str) -> Result<String, CalcError> {
        if self.access_mode & MODE_READ == 0 {
            return Err(CalcError::FileMode);
        }
        let mut f = File::open(path).map_err(|_| CalcError::FileOpen(path.to_string()))?;
        let mut s = String::new();
        f.read_to_string(&mut s)
            .map_err(|e| CalcError::IoFailed(e.to_string()))?;
        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_streams_preopened() {
        let t = FileTable::new();
        assert!(t.is_open(0));
        assert!(t.is_open(1));
        assert!(t.is_open(2));
        assert!(!t.is_open(3));
        assert_eq!(t.name(1), Some("(stdout)"));
    }

    #[test]
    fn open_write_read_roundtrip() {
        let dir = std::env::temp_dir();
        let path = dir.join("ratcalc_fileio_test.txt");
        let path = path.to_str().unwrap();
        let mut t = FileTable::new();
        let fid = t.open(path, "w").unwrap();
        t.write_bytes(fid, b"one\ntwo\n").unwrap();
        t.close(fid).unwrap();
        assert!(!t.is_open(fid));

        let fid = t.open(path, "r").unwrap();
        assert_eq!(t.read_line(fid).unwrap(), Some(b"one".to_vec()));
        assert_eq!(t.read_line(fid).unwrap(), Some(b"two".to_vec()));
        assert_eq!(t.read_line(fid).unwrap(), None);
        t.close(fid).unwrap();
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn permission_bits_gate_open() {
        let mut t = FileTable::new();
        t.set_access_mode(MODE_READ);
        assert!(matches!(
            t.open("/tmp/ratcalc_denied.txt", "w"),
            Err(CalcError::FileMode)
        ));
        t.set_access_mode(0);
        assert!(matches!(
            t.open("/etc/hostname", "r"),
            Err(CalcError::FileMode)
        ));
    }

    #[test]
    fn closed_fid_errors() {
        let mut t = FileTable::new();
        assert!(t.close(3).is_err());
        assert!(t.write_bytes(9, b"x").is_err());
    }
}

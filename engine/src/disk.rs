use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Byte-addressed random access storage. The core never assumes caching or
/// buffering is done for it; every `read_at`/`write_at` is a real I/O call.
pub trait Disk {
    fn length(&mut self) -> io::Result<u64>;
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;
}

/// Adapter over a real file on disk.
pub struct RandomAccessFile {
    file: File,
}

impl RandomAccessFile {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(RandomAccessFile { file })
    }

    pub fn remove<P: AsRef<Path>>(path: P) -> io::Result<()> {
        std::fs::remove_file(path)
    }
}

impl Disk for RandomAccessFile {
    fn length(&mut self) -> io::Result<u64> {
        self.file.metadata().map(|m| m.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }
}

/// In-memory stand-in for unit tests, avoiding filesystem setup.
impl Disk for Cursor<Vec<u8>> {
    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.get_ref().len() as u64 {
            self.get_mut().resize(end as usize, 0);
        }
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)
    }
}

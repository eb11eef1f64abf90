//! Config channel: the private pipe the host writes the handshake into
//!
//! Integers are 4-byte big-endian, blobs are an `i32` length followed by
//! exactly that many bytes. The protocol is positional, so a single short
//! read or write poisons the whole exchange; nothing here retries.

use std::fs::File;
use std::io::{self, Read, Write};
use std::mem::ManuallyDrop;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use capsule_core::ProcessId;
use tracing::{debug, trace};

use crate::error::{NsenterError, Result};
use crate::flags::NamespaceFlags;
use crate::namespace::NamespaceList;

/// Largest blob accepted from the channel
pub const MAX_BLOB_LEN: usize = 1024 * 1024;

/// Byte stream a [`ConfigChannel`] can run over
///
/// `release` is called by the bootstrap right before each process image
/// resumes, so a stream that must not outlive the handshake can close itself.
pub trait ChannelStream: Read + Write {
    /// Apply the post-handshake disposition of the underlying descriptor
    ///
    /// # Errors
    /// Returns error if closing the descriptor fails
    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ChannelStream for std::os::unix::net::UnixStream {}

/// What to do with the inherited descriptor once the handshake is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelDisposition {
    /// Leave it open for the host runtime
    #[default]
    Keep,
    /// Close it before resuming
    Close,
}

/// Descriptor inherited from the host, borrowed for the handshake
///
/// Dropping this never closes the descriptor; only [`ChannelStream::release`]
/// with [`ChannelDisposition::Close`] does.
#[derive(Debug)]
pub struct InheritedFd {
    file: Option<ManuallyDrop<File>>,
    raw: RawFd,
    disposition: ChannelDisposition,
}

impl InheritedFd {
    /// Parse a descriptor number as found in the trigger variable
    ///
    /// # Errors
    /// Returns error if the value is not a positive decimal integer
    pub fn parse(value: &str) -> Result<RawFd> {
        let fd = value.trim().parse::<RawFd>().map_err(|e| NsenterError::Config {
            message: format!("config pipe {value:?} is not a descriptor number: {e}"),
        })?;
        if fd <= 0 {
            return Err(NsenterError::Config {
                message: format!("config pipe must be a positive descriptor, got {fd}"),
            });
        }
        Ok(fd)
    }

    /// Borrow an already-open descriptor
    ///
    /// # Errors
    /// Returns error if `fd` is not open in this process
    pub fn open(fd: RawFd, disposition: ChannelDisposition) -> Result<Self> {
        // SAFETY: F_GETFD only inspects the descriptor table entry.
        if unsafe { libc::fcntl(fd, libc::F_GETFD) } == -1 {
            return Err(NsenterError::Config {
                message: format!(
                    "config pipe {fd} is not open: {}",
                    io::Error::last_os_error()
                ),
            });
        }

        // SAFETY: the descriptor is open (checked above) and the File is
        // wrapped in ManuallyDrop, so it is only closed through `release`.
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self {
            file: Some(ManuallyDrop::new(file)),
            raw: fd,
            disposition,
        })
    }

    /// How the descriptor is treated after the handshake
    #[must_use]
    pub const fn disposition(&self) -> ChannelDisposition {
        self.disposition
    }

    fn file(&self) -> io::Result<&File> {
        self.file
            .as_deref()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EBADF))
    }
}

impl AsRawFd for InheritedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.raw
    }
}

impl Read for InheritedFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Write for InheritedFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl ChannelStream for InheritedFd {
    fn release(&mut self) -> io::Result<()> {
        if self.disposition == ChannelDisposition::Keep {
            return Ok(());
        }
        if let Some(file) = self.file.take() {
            debug!(fd = self.raw, "Closing config pipe");
            drop(ManuallyDrop::into_inner(file));
        }
        Ok(())
    }
}

/// Typed reader/writer for the handshake messages
#[derive(Debug)]
pub struct ConfigChannel<S> {
    stream: S,
}

impl<S: Read + Write> ConfigChannel<S> {
    /// Wrap a duplex stream
    #[must_use]
    pub const fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read exactly `n` bytes
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or short read
    pub fn read_exact(&mut self, n: usize, step: &'static str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.stream
            .read_exact(&mut buf)
            .map_err(|cause| NsenterError::Channel { step, cause })?;
        trace!(step, len = n, "Read from config pipe");
        Ok(buf)
    }

    /// Write all of `bytes`
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or short write
    pub fn write_exact(&mut self, bytes: &[u8], step: &'static str) -> Result<()> {
        self.stream
            .write_all(bytes)
            .and_then(|()| self.stream.flush())
            .map_err(|cause| NsenterError::Channel { step, cause })?;
        trace!(step, len = bytes.len(), "Wrote to config pipe");
        Ok(())
    }

    /// Read a 4-byte big-endian integer
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or short read
    pub fn read_i32_be(&mut self, step: &'static str) -> Result<i32> {
        let buf = self.read_exact(4, step)?;
        Ok(buf.as_slice().get_i32())
    }

    /// Write a 4-byte big-endian integer
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or short write
    pub fn write_i32_be(&mut self, value: i32, step: &'static str) -> Result<()> {
        self.write_exact(&value.to_be_bytes(), step)
    }

    /// Read an `i32` length followed by exactly that many bytes
    ///
    /// # Errors
    /// Returns a channel error if the length is negative or too large, or
    /// the blob is cut short
    pub fn read_length_prefixed_blob(&mut self, step: &'static str) -> Result<Vec<u8>> {
        let len = self.read_i32_be(step)?;
        let len = usize::try_from(len)
            .map_err(|_| NsenterError::protocol(step, format!("negative blob length {len}")))?;
        if len > MAX_BLOB_LEN {
            return Err(NsenterError::protocol(
                step,
                format!("blob length {len} exceeds {MAX_BLOB_LEN}"),
            ));
        }
        self.read_exact(len, step)
    }

    /// Write `bytes` preceded by their `i32` length
    ///
    /// # Errors
    /// Returns a channel error if the blob is too large or the write fails
    pub fn write_length_prefixed_blob(&mut self, bytes: &[u8], step: &'static str) -> Result<()> {
        let frame = encode_blob(bytes, step)?;
        self.write_exact(&frame, step)
    }

    /// Read the namespace-list message
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or a malformed list
    pub fn read_namespace_list(&mut self) -> Result<NamespaceList> {
        let blob = self.read_length_prefixed_blob("reading namespace list")?;
        debug!(namespaces = %String::from_utf8_lossy(&blob), "Read namespace list");
        NamespaceList::decode(&blob)
    }

    /// Read the clone-flags message
    ///
    /// # Errors
    /// Returns a channel error on I/O failure
    pub fn read_clone_flags(&mut self) -> Result<NamespaceFlags> {
        self.read_i32_be("reading clone flags")
            .map(NamespaceFlags::from_bits)
    }

    /// Report the cloned child's pid to the host
    ///
    /// # Errors
    /// Returns a channel error on I/O failure
    pub fn write_child_pid(&mut self, pid: ProcessId) -> Result<()> {
        self.write_i32_be(pid.as_raw(), "writing child pid")
    }

    /// Host side: send the namespace list and clone flags in one frame
    ///
    /// # Errors
    /// Returns a channel error on I/O failure
    pub fn write_request(&mut self, list: &NamespaceList, flags: NamespaceFlags) -> Result<()> {
        let frame = encode_request(list, flags)?;
        self.write_exact(&frame, "writing bootstrap request")
    }

    /// Host side: read the pid reported by the bootstrap
    ///
    /// # Errors
    /// Returns a channel error on I/O failure or a non-positive pid
    pub fn read_child_pid(&mut self) -> Result<ProcessId> {
        const STEP: &str = "reading child pid";
        let pid = ProcessId::from_raw(self.read_i32_be(STEP)?);
        if !pid.is_valid() {
            return Err(NsenterError::protocol(STEP, format!("invalid child pid {pid}")));
        }
        Ok(pid)
    }

    /// Borrow the underlying stream
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Unwrap the underlying stream
    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn encode_blob(bytes: &[u8], step: &'static str) -> Result<Bytes> {
    let len = i32::try_from(bytes.len())
        .ok()
        .filter(|_| bytes.len() <= MAX_BLOB_LEN)
        .ok_or_else(|| {
            NsenterError::protocol(step, format!("blob of {} bytes is too large", bytes.len()))
        })?;

    let mut frame = BytesMut::with_capacity(4 + bytes.len());
    frame.put_i32(len);
    frame.put_slice(bytes);
    Ok(frame.freeze())
}

/// Encode the host's half of the handshake: namespace list then clone flags
///
/// # Errors
/// Returns error if the encoded list is too large
pub fn encode_request(list: &NamespaceList, flags: NamespaceFlags) -> Result<Bytes> {
    let blob = encode_blob(&list.encode(), "encoding namespace list")?;

    let mut frame = BytesMut::with_capacity(blob.len() + 4);
    frame.put(blob);
    frame.put_i32(flags.bits());
    Ok(frame.freeze())
}

/// Encode a length-prefixed blob, as used for the post-handshake payload
///
/// # Errors
/// Returns error if the payload is too large
pub fn encode_payload(bytes: &[u8]) -> Result<Bytes> {
    encode_blob(bytes, "encoding payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::NamespaceHandle;
    use std::io::Cursor;
    use std::path::Path;

    /// Reads from a fixed script, records writes
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_i32_is_big_endian() {
        let mut channel = ConfigChannel::new(Duplex::new(vec![0x20, 0x00, 0x00, 0x01]));
        assert_eq!(channel.read_i32_be("test").unwrap(), 0x2000_0001);
    }

    #[test]
    fn test_write_child_pid() {
        let mut channel = ConfigChannel::new(Duplex::new(Vec::new()));
        channel.write_child_pid(ProcessId::from_raw(0x0102_0304)).unwrap();
        assert_eq!(channel.into_inner().output, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_short_read_is_channel_error() {
        let mut channel = ConfigChannel::new(Duplex::new(vec![0, 0]));
        let err = channel.read_clone_flags().unwrap_err();
        assert!(matches!(err, NsenterError::Channel { step: "reading clone flags", .. }));
    }

    #[test]
    fn test_blob_reads_exactly_len_bytes() {
        let mut input = vec![0, 0, 0, 3];
        input.extend_from_slice(b"abcdef");
        let mut channel = ConfigChannel::new(Duplex::new(input));

        assert_eq!(channel.read_length_prefixed_blob("test").unwrap(), b"abc");
        assert_eq!(channel.read_exact(3, "test").unwrap(), b"def");
    }

    #[test]
    fn test_negative_blob_length_is_rejected() {
        let mut channel = ConfigChannel::new(Duplex::new((-1i32).to_be_bytes().to_vec()));
        let err = channel.read_length_prefixed_blob("test").unwrap_err();
        assert!(err.to_string().contains("negative blob length"));
    }

    #[test]
    fn test_oversized_blob_length_is_rejected() {
        let len = i32::try_from(MAX_BLOB_LEN + 1).unwrap();
        let mut channel = ConfigChannel::new(Duplex::new(len.to_be_bytes().to_vec()));
        assert!(channel.read_length_prefixed_blob("test").is_err());
    }

    #[test]
    fn test_request_decodes_back() {
        let list = NamespaceList::new(vec![
            NamespaceHandle::new("/proc/1/ns/uts"),
            NamespaceHandle::new("/proc/1/ns/mnt"),
        ])
        .unwrap();
        let frame = encode_request(&list, NamespaceFlags::UTS).unwrap();

        let mut channel = ConfigChannel::new(Duplex::new(frame.to_vec()));
        let decoded = channel.read_namespace_list().unwrap();
        let paths: Vec<&Path> = decoded.handles().iter().map(NamespaceHandle::path).collect();

        assert_eq!(paths, vec![Path::new("/proc/1/ns/uts"), Path::new("/proc/1/ns/mnt")]);
        assert_eq!(channel.read_clone_flags().unwrap(), NamespaceFlags::UTS);
    }

    #[test]
    fn test_read_child_pid_rejects_non_positive() {
        let mut channel = ConfigChannel::new(Duplex::new(0i32.to_be_bytes().to_vec()));
        assert!(channel.read_child_pid().is_err());
    }

    #[test]
    fn test_parse_fd() {
        assert_eq!(InheritedFd::parse("3").unwrap(), 3);
        assert_eq!(InheritedFd::parse(" 12\n").unwrap(), 12);
        assert!(InheritedFd::parse("0").is_err());
        assert!(InheritedFd::parse("-4").is_err());
        assert!(InheritedFd::parse("three").is_err());
        assert!(InheritedFd::parse("").is_err());
    }

    #[test]
    fn test_open_rejects_closed_fd() {
        // far above any descriptor the test harness opens
        assert!(InheritedFd::open(1_000_000, ChannelDisposition::Keep).is_err());
    }

    #[test]
    fn test_inherited_fd_keep_and_close() {
        use std::os::unix::net::UnixStream;

        let (ours, theirs) = UnixStream::pair().unwrap();
        let raw = theirs.as_raw_fd();

        let mut kept = InheritedFd::open(raw, ChannelDisposition::Keep).unwrap();
        kept.release().unwrap();
        drop(kept);
        // SAFETY: only inspects the descriptor table
        assert_ne!(unsafe { libc::fcntl(raw, libc::F_GETFD) }, -1);

        let mut closed = InheritedFd::open(raw, ChannelDisposition::Close).unwrap();
        closed.release().unwrap();
        assert!(closed.write(b"x").is_err());
        // the descriptor now belongs to nobody; keep `theirs` from closing it twice
        std::mem::forget(theirs);
        drop(ours);
    }
}

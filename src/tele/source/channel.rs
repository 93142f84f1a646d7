use crate::tele::ByteOrder;
use crate::util::constants::{BYTES_IN_PAGE, BYTES_IN_WORD};
use crate::util::Address;
use std::io;

/// The operating system requests a live memory source needs. Requests are issued from a
/// single thread, one at a time.
pub trait ProcessChannel: Send + Sync + 'static {
    /// Read up to `buf.len()` bytes at `address`. Returns the number of bytes read.
    fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize>;

    /// Write up to `bytes.len()` bytes at `address`. Returns the number of bytes written.
    fn write(&self, address: Address, bytes: &[u8]) -> io::Result<usize>;

    /// Stop the target and wait until it has stopped.
    fn suspend(&self) -> io::Result<()>;

    fn resume(&self) -> io::Result<()>;

    fn kill(&self) -> io::Result<()>;

    fn threads(&self) -> io::Result<Vec<u64>>;

    fn page_size(&self) -> usize {
        BYTES_IN_PAGE
    }

    fn byte_order(&self) -> ByteOrder {
        ByteOrder::native()
    }

    fn word_size(&self) -> usize {
        BYTES_IN_WORD
    }
}

#[cfg(target_os = "linux")]
pub use self::procfs::ProcfsChannel;

#[cfg(target_os = "linux")]
mod procfs {
    use super::ProcessChannel;
    use crate::util::memory::wrap_libc_call;
    use crate::util::Address;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    /// A process of the same machine, reached through `/proc`, signals and cross-memory
    /// attach (`process_vm_readv`/`process_vm_writev`). The caller needs the permission to
    /// ptrace the target.
    pub struct ProcfsChannel {
        pid: libc::pid_t,
    }

    impl ProcfsChannel {
        pub fn new(pid: u32) -> io::Result<Self> {
            let pid = libc::pid_t::try_from(pid)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
            let channel = ProcfsChannel { pid };
            // Fails if there is no such process.
            fs::metadata(channel.proc_path("stat"))?;
            Ok(channel)
        }

        pub fn pid(&self) -> u32 {
            self.pid as u32
        }

        fn proc_path(&self, entry: &str) -> PathBuf {
            PathBuf::from(format!("/proc/{}/{}", self.pid, entry))
        }

        /// The state letter of `/proc/<pid>/stat`, which follows the parenthesized command.
        fn state(&self) -> io::Result<char> {
            let stat = fs::read_to_string(self.proc_path("stat"))?;
            stat.rfind(')')
                .and_then(|i| stat[i + 1..].trim_start().chars().next())
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, format!("malformed stat: {}", stat))
                })
        }

        fn signal(&self, signal: libc::c_int) -> io::Result<()> {
            wrap_libc_call(&|| unsafe { libc::kill(self.pid, signal) }, 0)
        }
    }

    impl ProcessChannel for ProcfsChannel {
        fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
            let local = libc::iovec {
                iov_base: buf.as_mut_ptr() as *mut libc::c_void,
                iov_len: buf.len(),
            };
            let remote = libc::iovec {
                iov_base: address.to_mut_ptr(),
                iov_len: buf.len(),
            };
            let n = unsafe { libc::process_vm_readv(self.pid, &local, 1, &remote, 1, 0) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        fn write(&self, address: Address, bytes: &[u8]) -> io::Result<usize> {
            let local = libc::iovec {
                iov_base: bytes.as_ptr() as *mut libc::c_void,
                iov_len: bytes.len(),
            };
            let remote = libc::iovec {
                iov_base: address.to_mut_ptr(),
                iov_len: bytes.len(),
            };
            let n = unsafe { libc::process_vm_writev(self.pid, &local, 1, &remote, 1, 0) };
            if n < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(n as usize)
            }
        }

        fn suspend(&self) -> io::Result<()> {
            self.signal(libc::SIGSTOP)?;
            // SIGSTOP is delivered asynchronously.
            loop {
                match self.state()? {
                    'T' | 't' => return Ok(()),
                    'Z' | 'X' | 'x' => {
                        return Err(io::Error::new(
                            io::ErrorKind::NotFound,
                            format!("process {} exited", self.pid),
                        ))
                    }
                    _ => thread::sleep(Duration::from_millis(1)),
                }
            }
        }

        fn resume(&self) -> io::Result<()> {
            self.signal(libc::SIGCONT)
        }

        fn kill(&self) -> io::Result<()> {
            self.signal(libc::SIGKILL)
        }

        fn threads(&self) -> io::Result<Vec<u64>> {
            let mut threads = vec![];
            for entry in fs::read_dir(self.proc_path("task"))? {
                if let Some(tid) = entry?
                    .file_name()
                    .to_str()
                    .and_then(|name| name.parse::<u64>().ok())
                {
                    threads.push(tid);
                }
            }
            threads.sort_unstable();
            Ok(threads)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn threads_of_this_process() {
            let channel = ProcfsChannel::new(std::process::id()).unwrap();
            let threads = channel.threads().unwrap();
            assert!(threads.contains(&(std::process::id() as u64)));
            assert!(channel.state().is_ok());
        }

        #[test]
        fn stop_and_continue_a_child() {
            use crate::tele::source::{LiveProcess, MemorySource};
            use crate::tele::ProcessState;

            let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
            let channel = ProcfsChannel::new(child.id()).unwrap();
            let stat = channel.proc_path("stat");
            let process = LiveProcess::attach(channel, ProcessState::Running).unwrap();
            process.suspend().unwrap();
            assert_eq!(process.epoch(), 1);
            let stat_text = fs::read_to_string(&stat).unwrap();
            assert!(stat_text.contains(") T") || stat_text.contains(") t"));
            assert_eq!(process.enumerate_threads().unwrap(), vec![child.id() as u64]);
            process.resume().unwrap();
            process.suspend().unwrap();
            assert_eq!(process.epoch(), 2);
            process.kill().unwrap();
            assert_eq!(process.state(), ProcessState::Terminated);
            child.wait().unwrap();
        }

        #[test]
        fn no_such_process() {
            assert!(ProcfsChannel::new(i32::MAX as u32).is_err());
        }

        #[test]
        fn read_own_memory() {
            let channel = ProcfsChannel::new(std::process::id()).unwrap();
            let value: [u8; 8] = *b"beltway!";
            let mut buf = [0u8; 8];
            match channel.read(Address::from_ref(&value), &mut buf) {
                Ok(n) => {
                    assert_eq!(n, 8);
                    assert_eq!(&buf, b"beltway!");
                }
                // Cross-memory attach may be disabled in a sandbox.
                Err(e) => assert!(matches!(
                    e.raw_os_error(),
                    Some(libc::EPERM) | Some(libc::ENOSYS)
                )),
            }
        }
    }
}

use super::{MemorySource, ProcessChannel};
use crate::scheduler::SingleThreadExecutor;
use crate::tele::{ByteOrder, ProcessState, TeleError};
use crate::util::Address;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A running or stopped process. Memory can only be read and written while the process is
/// stopped. Every stop after a resume advances the epoch, which invalidates every page
/// cached from this source.
///
/// All requests to the process go through one dedicated thread.
pub struct LiveProcess {
    channel: Arc<dyn ProcessChannel>,
    executor: SingleThreadExecutor,
    state: Mutex<ProcessState>,
    epoch: AtomicU64,
    page_size: usize,
    byte_order: ByteOrder,
    word_size: usize,
}

impl LiveProcess {
    /// Control a process through `channel`. `state` is the state the process is in now,
    /// `Stopped` or `Running`.
    pub fn attach(channel: impl ProcessChannel, state: ProcessState) -> io::Result<Self> {
        debug_assert!(matches!(state, ProcessState::Stopped | ProcessState::Running));
        let executor = SingleThreadExecutor::spawn("beltway-tele")?;
        Ok(LiveProcess {
            page_size: channel.page_size(),
            byte_order: channel.byte_order(),
            word_size: channel.word_size(),
            channel: Arc::new(channel),
            executor,
            state: Mutex::new(state),
            epoch: AtomicU64::new(0),
        })
    }

    fn request<R, F>(&self, request: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&dyn ProcessChannel) -> R + Send + 'static,
    {
        let channel = self.channel.clone();
        self.executor.execute(move || request(channel.as_ref()))
    }

    fn check_stopped(&self, operation: &'static str) -> Result<(), TeleError> {
        match *self.state.lock().unwrap() {
            ProcessState::Stopped => Ok(()),
            ProcessState::Terminated => Err(TeleError::ProcessTerminated),
            _ => Err(TeleError::ProcessNotStopped(operation)),
        }
    }
}

impl MemorySource for LiveProcess {
    fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn word_size(&self) -> usize {
        self.word_size
    }

    fn state(&self) -> ProcessState {
        *self.state.lock().unwrap()
    }

    fn read(&self, address: Address, buf: &mut [u8]) -> Result<(), TeleError> {
        self.check_stopped("read its memory")?;
        let length = buf.len();
        let (n, bytes) = self.request(move |channel| {
            let mut bytes = vec![0u8; length];
            channel.read(address, &mut bytes).map(|n| (n, bytes))
        })?;
        if n < length {
            return Err(TeleError::Unmapped {
                address: address + n,
                length: length - n,
            });
        }
        buf.copy_from_slice(&bytes);
        Ok(())
    }

    fn write(&self, address: Address, bytes: &[u8]) -> Result<(), TeleError> {
        self.check_stopped("write its memory")?;
        let length = bytes.len();
        let bytes = bytes.to_vec();
        let n = self.request(move |channel| channel.write(address, &bytes))?;
        if n < length {
            return Err(TeleError::Unmapped {
                address: address + n,
                length: length - n,
            });
        }
        Ok(())
    }

    fn suspend(&self) -> Result<(), TeleError> {
        let mut state = self.state.lock().unwrap();
        match *state {
            ProcessState::Stopped => return Ok(()),
            ProcessState::Terminated => return Err(TeleError::ProcessTerminated),
            _ => {}
        }
        self.request(|channel| channel.suspend())?;
        *state = ProcessState::Stopped;
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("target stopped, epoch {}", epoch);
        Ok(())
    }

    fn resume(&self) -> Result<(), TeleError> {
        let mut state = self.state.lock().unwrap();
        match *state {
            ProcessState::Running => return Ok(()),
            ProcessState::Terminated => return Err(TeleError::ProcessTerminated),
            _ => {}
        }
        self.request(|channel| channel.resume())?;
        *state = ProcessState::Running;
        debug!("target resumed");
        Ok(())
    }

    fn kill(&self) -> Result<(), TeleError> {
        let mut state = self.state.lock().unwrap();
        if *state == ProcessState::Terminated {
            return Ok(());
        }
        self.request(|channel| channel.kill())?;
        *state = ProcessState::Terminated;
        info!("target killed");
        Ok(())
    }

    fn enumerate_threads(&self) -> Result<Vec<u64>, TeleError> {
        if self.state() == ProcessState::Terminated {
            return Err(TeleError::ProcessTerminated);
        }
        Ok(self.request(|channel| channel.threads())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tele::RemotePageCache;
    use crate::util::constants::BYTES_IN_PAGE;
    use std::sync::atomic::AtomicUsize;
    use std::thread::{self, ThreadId};

    const BASE: Address = unsafe { Address::from_usize(0x10_0000) };

    /// Two pages of memory at `BASE`. Records the thread every request runs on.
    struct FakeChannel {
        memory: Mutex<Vec<u8>>,
        threads: Mutex<Vec<ThreadId>>,
        stops: AtomicUsize,
    }

    impl FakeChannel {
        fn new() -> Self {
            FakeChannel {
                memory: Mutex::new(vec![0u8; 2 * BYTES_IN_PAGE]),
                threads: Mutex::new(vec![]),
                stops: AtomicUsize::new(0),
            }
        }

        fn record(&self) {
            self.threads.lock().unwrap().push(thread::current().id());
        }
    }

    impl ProcessChannel for Arc<FakeChannel> {
        fn read(&self, address: Address, buf: &mut [u8]) -> io::Result<usize> {
            self.record();
            let memory = self.memory.lock().unwrap();
            let offset = address - BASE;
            let n = buf.len().min(memory.len().saturating_sub(offset));
            buf[..n].copy_from_slice(&memory[offset..offset + n]);
            Ok(n)
        }

        fn write(&self, address: Address, bytes: &[u8]) -> io::Result<usize> {
            self.record();
            let offset = address - BASE;
            self.memory.lock().unwrap()[offset..offset + bytes.len()].copy_from_slice(bytes);
            Ok(bytes.len())
        }

        fn suspend(&self) -> io::Result<()> {
            self.record();
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&self) -> io::Result<()> {
            self.record();
            Ok(())
        }

        fn kill(&self) -> io::Result<()> {
            self.record();
            Ok(())
        }

        fn threads(&self) -> io::Result<Vec<u64>> {
            self.record();
            Ok(vec![7, 8])
        }
    }

    #[test]
    fn memory_access_needs_a_stopped_process() {
        let channel = Arc::new(FakeChannel::new());
        let process = LiveProcess::attach(channel.clone(), ProcessState::Running).unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            process.read(BASE, &mut buf),
            Err(TeleError::ProcessNotStopped(_))
        ));
        assert!(matches!(
            process.write(BASE, &buf),
            Err(TeleError::ProcessNotStopped(_))
        ));
        process.suspend().unwrap();
        process.write(BASE, b"12345678").unwrap();
        process.read(BASE, &mut buf).unwrap();
        assert_eq!(&buf, b"12345678");
    }

    #[test]
    fn every_stop_after_a_resume_advances_the_epoch() {
        let channel = Arc::new(FakeChannel::new());
        let process = LiveProcess::attach(channel.clone(), ProcessState::Stopped).unwrap();
        assert_eq!(process.epoch(), 0);
        process.suspend().unwrap();
        assert_eq!(process.epoch(), 0);
        assert_eq!(channel.stops.load(Ordering::SeqCst), 0);
        for epoch in 1..4 {
            process.resume().unwrap();
            assert_eq!(process.state(), ProcessState::Running);
            process.suspend().unwrap();
            assert_eq!(process.epoch(), epoch);
        }
        // Writes leave the epoch alone.
        process.write(BASE, &[1]).unwrap();
        assert_eq!(process.epoch(), 3);
    }

    #[test]
    fn short_read_is_unmapped() {
        let channel = Arc::new(FakeChannel::new());
        let process = LiveProcess::attach(channel, ProcessState::Stopped).unwrap();
        let mut buf = [0u8; 16];
        match process.read(BASE + (2 * BYTES_IN_PAGE - 8), &mut buf) {
            Err(TeleError::Unmapped { address, length }) => {
                assert_eq!(address, BASE + 2 * BYTES_IN_PAGE);
                assert_eq!(length, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn requests_run_on_one_thread() {
        let channel = Arc::new(FakeChannel::new());
        let process = LiveProcess::attach(channel.clone(), ProcessState::Running).unwrap();
        process.suspend().unwrap();
        let mut buf = [0u8; 4];
        process.read(BASE, &mut buf).unwrap();
        assert_eq!(process.enumerate_threads().unwrap(), vec![7, 8]);
        process.resume().unwrap();
        process.kill().unwrap();
        let threads = channel.threads.lock().unwrap();
        assert_eq!(threads.len(), 5);
        assert!(threads.iter().all(|t| *t == threads[0]));
        assert_ne!(threads[0], thread::current().id());
    }

    #[test]
    fn terminated_process() {
        let channel = Arc::new(FakeChannel::new());
        let process = LiveProcess::attach(channel, ProcessState::Stopped).unwrap();
        process.kill().unwrap();
        assert_eq!(process.state(), ProcessState::Terminated);
        let mut buf = [0u8; 4];
        assert!(matches!(
            process.read(BASE, &mut buf),
            Err(TeleError::ProcessTerminated)
        ));
        assert!(matches!(process.resume(), Err(TeleError::ProcessTerminated)));
        assert!(matches!(
            process.enumerate_threads(),
            Err(TeleError::ProcessTerminated)
        ));
    }

    #[test]
    fn cache_rereads_after_the_target_ran() {
        let channel = Arc::new(FakeChannel::new());
        let process = Arc::new(LiveProcess::attach(channel.clone(), ProcessState::Stopped).unwrap());
        let cache = RemotePageCache::with_pool(
            process.clone(),
            crate::tele::BufferPool::new(4 * BYTES_IN_PAGE, false),
        );
        assert_eq!(cache.read_u8(BASE).unwrap(), 0);
        process.resume().unwrap();
        // The target changes its memory while it runs.
        channel.memory.lock().unwrap()[0] = 9;
        process.suspend().unwrap();
        assert_eq!(cache.read_u8(BASE).unwrap(), 9);
        assert_eq!(cache.cached_page(0x100).unwrap().refresh_count(), 2);
    }
}

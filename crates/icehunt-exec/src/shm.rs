//! The coverage channel: a System V shared-memory segment the
//! instrumented compiler writes edge counters into.

use crate::ExecError;
use icehunt_protocol::MAP_SIZE;

/// One attached coverage segment.
///
/// The engine creates a fresh segment per trial, advertises its id to the
/// child through the instrumentation environment variable, and reads the
/// bytes back after the child exits. Dropping the handle removes the
/// kernel identifier and detaches the mapping, so a segment can never
/// outlive the trial that created it — including when the engine unwinds.
#[derive(Debug)]
pub struct CoverageShm {
    id: libc::c_int,
    base: *mut u8,
}

impl CoverageShm {
    /// Create and attach a zero-filled segment of [`MAP_SIZE`] bytes.
    pub fn new() -> Result<Self, ExecError> {
        let id = unsafe {
            libc::shmget(
                libc::IPC_PRIVATE,
                MAP_SIZE,
                libc::IPC_CREAT | libc::IPC_EXCL | 0o600,
            )
        };
        if id < 0 {
            return Err(shm_error("shmget"));
        }

        let base = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if base == usize::MAX as *mut libc::c_void {
            let err = shm_error("shmat");
            unsafe {
                libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut());
            }
            return Err(err);
        }

        Ok(CoverageShm {
            id,
            base: base.cast(),
        })
    }

    /// The segment id rendered the way the instrumentation expects it in
    /// its environment variable.
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// Clear the map. A pooled segment must be zeroed between runs; a
    /// fresh segment arrives zeroed from the kernel.
    pub fn zero(&mut self) {
        unsafe {
            std::ptr::write_bytes(self.base, 0, MAP_SIZE);
        }
    }

    /// The trace bits as written by the (now exited) child.
    ///
    /// Only meaningful after the child has been reaped; the engine is the
    /// single reader and the child the single writer, never concurrently.
    pub fn trace_bits(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base, MAP_SIZE) }
    }
}

impl Drop for CoverageShm {
    fn drop(&mut self) {
        unsafe {
            if libc::shmctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) == -1 {
                log::warn!("shmctl(IPC_RMID) failed for segment {}", self.id);
            }
            if libc::shmdt(self.base.cast()) == -1 {
                log::warn!("shmdt() failed for segment {}", self.id);
            }
        }
    }
}

fn shm_error(call: &'static str) -> ExecError {
    ExecError::Shm {
        call,
        source: std::io::Error::last_os_error(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_starts_zeroed_with_full_size() {
        let shm = CoverageShm::new().unwrap();
        let bits = shm.trace_bits();
        assert_eq!(bits.len(), MAP_SIZE);
        assert!(bits.iter().all(|&b| b == 0));
    }

    #[test]
    fn id_string_is_a_number() {
        let shm = CoverageShm::new().unwrap();
        assert!(shm.id_string().parse::<i32>().is_ok());
    }

    #[test]
    fn zero_clears_written_bytes() {
        let mut shm = CoverageShm::new().unwrap();
        unsafe {
            shm.base.add(3).write(7);
            shm.base.add(200).write(1);
        }
        assert_eq!(shm.trace_bits()[3], 7);

        shm.zero();
        assert!(shm.trace_bits().iter().all(|&b| b == 0));
    }

    #[test]
    fn segments_are_distinct() {
        let a = CoverageShm::new().unwrap();
        let b = CoverageShm::new().unwrap();
        assert_ne!(a.id_string(), b.id_string());
    }
}

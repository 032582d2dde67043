use std::os::raw::{c_int, c_void};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::{fs, io};

use crate::hw;
use crate::registers::Registers;
use crate::sys;

/// Register window of a device exposed through the Linux UIO framework
///
/// The first 4 KiB of the device are mapped once on open. Reads and writes are each
/// serialized by their own lock, so a reader never waits for a writer and vice versa.
///
/// The destructor automatically unmaps the window and closes the device.
pub struct Uio {
    path: PathBuf,
    fd: c_int,
    base: *mut u32,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

// The mapping is only touched through volatile accesses under the locks.
unsafe impl Send for Uio {}
unsafe impl Sync for Uio {}

impl Uio {
    /// Opens a UIO device node and maps its register window
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the device node, e.g. `/dev/uio0`
    ///
    /// # Example
    ///
    /// ```no_run
    /// use vdma::Uio;
    /// let regs = Uio::open("/dev/uio0");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let fd = sys::open(&path, libc::O_RDWR | libc::O_SYNC)?;
        let base = match sys::mmap(fd, hw::REGISTER_SPAN, 0) {
            Ok(base) => base as *mut u32,
            Err(e) => {
                let _ = sys::close(fd);
                return Err(e);
            }
        };

        log::debug!("mapped {} at {:p}", path.as_ref().display(), base);
        Ok(Uio {
            path: path.as_ref().to_path_buf(),
            fd,
            base,
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the UIO device whose sysfs name is `name`
    pub fn open_by_name(name: &str) -> io::Result<Self> {
        match find(name) {
            Some(node) => Uio::open(node.path()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no UIO device named {}", name),
            )),
        }
    }

    /// Returns the path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn word(&self, offset: usize) -> *mut u32 {
        debug_assert!(
            offset % 4 == 0 && offset < hw::REGISTER_SPAN,
            "register offset {:#x} outside of the mapped window",
            offset
        );
        unsafe { self.base.add(offset / 4) }
    }
}

impl Registers for Uio {
    fn read(&self, offset: usize) -> u32 {
        let word = self.word(offset);
        let _guard = self.read_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { word.read_volatile() }
    }

    fn write(&self, offset: usize, value: u32) {
        let word = self.word(offset);
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        unsafe { word.write_volatile(value) }
    }
}

impl Drop for Uio {
    fn drop(&mut self) {
        unsafe {
            // ignore errors
            let _ = sys::munmap(self.base as *mut c_void, hw::REGISTER_SPAN);
        }
        let _ = sys::close(self.fd);
    }
}

/// A UIO device node known to the system
pub struct Node {
    path: PathBuf,
}

impl Node {
    /// Returns a node handle for the given device path
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Node {
            path: PathBuf::from(path.as_ref()),
        }
    }

    /// Returns the absolute path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the index of the device node, e.g. 2 for /dev/uio2
    pub fn index(&self) -> Option<usize> {
        let file_name = self.path.file_name()?.to_str()?;
        file_name.strip_prefix("uio")?.parse::<usize>().ok()
    }

    /// Returns the name the kernel gave the device, usually its device tree node name
    pub fn name(&self) -> Option<String> {
        let index = self.index()?;
        let path = format!("/sys/class/uio/uio{}/name", index);
        let name = fs::read_to_string(path).ok()?;
        Some(name.trim().to_string())
    }
}

/// Returns a list of UIO devices currently known to the system
pub fn enum_devices() -> Vec<Node> {
    let mut devices = Vec::new();

    let entries = match fs::read_dir("/dev") {
        Ok(entries) => entries,
        Err(_) => return devices,
    };

    for dentry in entries.flatten() {
        let file_name = dentry.file_name();
        let file_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };

        if file_name.starts_with("uio") {
            devices.push(Node::new(dentry.path()));
        }
    }

    devices.sort_by_key(|node| node.index());
    devices
}

/// Finds the UIO device whose sysfs name is `name`
pub fn find(name: &str) -> Option<Node> {
    enum_devices()
        .into_iter()
        .find(|node| node.name().as_deref() == Some(name))
}

use std::fmt::Debug;
use std::io::Write;

/// Sink for diagnostic lines. Loggers that discard everything return `None`
/// so that the `log!` macro skips formatting altogether.
pub trait Logger: Debug {
    fn line_writer(&mut self) -> Option<&mut dyn Write>;
}

#[derive(Debug, Default)]
pub struct DummyLogger;

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct VecLogger(Vec<u8>);

/// Writes lines to a file, each prefixed with a timestamp. The file is closed
/// when the logger is dropped.
#[derive(Debug)]
pub struct FileLogger(std::fs::File);

fn secs_since_unix_epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_secs_f64())
        .unwrap_or(0.)
}

impl FileLogger {
    pub fn new(file: std::fs::File) -> Self {
        Self(file)
    }

    pub fn create<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        Ok(Self(std::fs::File::create(path)?))
    }
}

impl VecLogger {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(String::from).collect()
    }
}

/////////////////

impl Logger for DummyLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        None
    }
}

impl Logger for VecLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        Some(self)
    }
}

impl Logger for FileLogger {
    fn line_writer(&mut self) -> Option<&mut dyn Write> {
        let _ = write!(&mut self.0, "at {:.6} ", secs_since_unix_epoch());
        Some(&mut self.0)
    }
}

///////////////////

impl Write for VecLogger {
    fn flush(&mut self) -> Result<(), std::io::Error> {
        Ok(())
    }
    fn write(&mut self, data: &[u8]) -> Result<usize, std::io::Error> {
        self.0.extend_from_slice(data);
        Ok(data.len())
    }
}

use std::fmt;
use std::path::{Path, PathBuf};

pub const OUTPUT_EXTENSION: &str = "jpg";

/// One source file to one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Job {
    /// Destination mirrors the source's position below `source_root`
    pub fn new(source: PathBuf, source_root: &Path, destination_root: &Path) -> Self {
        let relative_dir = source
            .parent()
            .and_then(|parent| parent.strip_prefix(source_root).ok())
            .unwrap_or(Path::new(""));

        let destination = destination_root
            .join(relative_dir)
            .join(output_file_name(&source));

        Job {
            source,
            destination,
        }
    }

    /// Same job, writing to `IMG (n).jpg` instead of `IMG.jpg`
    pub fn numbered(mut self, n: usize) -> Self {
        let mut name = self.source.file_stem().unwrap_or_default().to_os_string();
        name.push(format!(" ({n}).{OUTPUT_EXTENSION}"));
        self.destination.set_file_name(name);
        self
    }

    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned()
    }
}

/// `IMG_0001.HEIC` -> `IMG_0001.jpg`
pub fn output_file_name(source: &Path) -> PathBuf {
    // only the last extension goes, `a.b.heic` keeps its `a.b` stem
    Path::new(source.file_name().unwrap_or_default()).with_extension(OUTPUT_EXTENSION)
}

/// Per-job state machine. Stages run in declaration order; any failure jumps
/// straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Decoding,
    Adjusting,
    Encoding,
    Writing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Decoding => write!(f, "decoding"),
            JobState::Adjusting => write!(f, "adjusting"),
            JobState::Encoding => write!(f, "encoding"),
            JobState::Writing => write!(f, "writing"),
            JobState::Done => write!(f, "done"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[test]
fn output_name_replaces_only_last_extension() {
    assert_eq!(
        output_file_name(Path::new("IMG_0001.HEIC")),
        Path::new("IMG_0001.jpg")
    );
    assert_eq!(
        output_file_name(Path::new("Trip v2 (2024).final.heic")),
        Path::new("Trip v2 (2024).final.jpg")
    );
}

#[cfg(unix)]
#[test]
fn output_name_keeps_non_utf8_bytes() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let source = Path::new(OsStr::from_bytes(b"caf\xe9.heic"));

    assert_eq!(
        output_file_name(source).as_os_str().as_bytes(),
        b"caf\xe9.jpg"
    );
}

#[test]
fn numbered_destination_stays_in_place() {
    let job = Job::new(
        PathBuf::from("/photos/2024/IMG.HEIC"),
        Path::new("/photos"),
        Path::new("/out"),
    )
    .numbered(2);

    assert_eq!(job.destination, PathBuf::from("/out/2024/IMG (2).jpg"));
    assert_eq!(job.source, PathBuf::from("/photos/2024/IMG.HEIC"));
}

#[test]
fn destination_mirrors_subdirectory() {
    let job = Job::new(
        PathBuf::from("/photos/2024/june/IMG_1.heic"),
        Path::new("/photos"),
        Path::new("/out"),
    );

    assert_eq!(job.destination, PathBuf::from("/out/2024/june/IMG_1.jpg"));
    assert_eq!(job.file_name(), "IMG_1.heic");
}

#[test]
fn destination_for_top_level_file() {
    let job = Job::new(
        PathBuf::from("/photos/IMG_2.HEIC"),
        Path::new("/photos"),
        Path::new("/out"),
    );

    assert_eq!(job.destination, PathBuf::from("/out/IMG_2.jpg"));
}

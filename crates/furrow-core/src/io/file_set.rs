use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::FurrowError;
use crate::types::{FileId, Result};

/// Block size assumed on platforms that cannot report one.
#[cfg(not(unix))]
const FALLBACK_BLOCK_SIZE: usize = 4096;

/// A named, bucketed collection of open file handles.
#[derive(Debug)]
pub struct FileSet {
    name: String,
    files: Vec<Option<File>>,
}

impl FileSet {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bucket_count(&self) -> usize {
        self.files.len()
    }

    /// Handle for `bucket`, if still open.
    pub fn file(&self, bucket: usize) -> Option<&File> {
        self.files.get(bucket).and_then(Option::as_ref)
    }
}

/// Owns every file set the queue operates on, plus the uniform block size
/// contract across them.
///
/// The dispatch thread is the only mutator of file state; the producer side
/// touches the registry once, to open the plot file on demand.
#[derive(Debug)]
pub struct FileRegistry {
    work_dir: PathBuf,
    direct_io: bool,
    sets: Vec<Option<FileSet>>,
    block_size: Option<usize>,
}

impl FileRegistry {
    pub fn new(work_dir: PathBuf, direct_io: bool) -> Self {
        Self {
            work_dir,
            direct_io,
            sets: (0..FileId::COUNT).map(|_| None).collect(),
            block_size: None,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Uniform block size published by the first opened file, if any.
    pub fn block_size(&self) -> Option<usize> {
        self.block_size
    }

    /// Opens `bucket_count` handles named `<base_name>_<bucket>.tmp` (or,
    /// for the plot set, `base_name` verbatim) and registers them under
    /// `file_id`.
    ///
    /// The first open publishes the registry block size; every later temp
    /// file must report the same size. The plot file is exempt from the
    /// match check, and its open failure surfaces as the recoverable
    /// [`FurrowError::PlotFileOpen`].
    pub fn init_set(&mut self, file_id: FileId, base_name: &str, bucket_count: u32) -> Result<()> {
        let mut files = Vec::with_capacity(bucket_count as usize);

        for bucket in 0..bucket_count {
            let path = self.set_path(file_id, base_name, bucket);
            let file = open_work_file(&path, self.direct_io).map_err(|source| {
                if file_id == FileId::Plot {
                    FurrowError::PlotFileOpen { path: path.clone(), source }
                } else {
                    FurrowError::TempFileOpen { path: path.clone(), source }
                }
            })?;

            let block_size = file_block_size(&file)?;
            match self.block_size {
                None => {
                    if block_size < 2 {
                        return Err(FurrowError::InvalidBlockSize(block_size));
                    }
                    self.block_size = Some(block_size);
                }
                Some(expected) if file_id != FileId::Plot && block_size != expected => {
                    return Err(FurrowError::BlockSizeMismatch {
                        expected,
                        actual: block_size,
                    });
                }
                Some(_) => {}
            }

            files.push(Some(file));
        }

        self.sets[file_id.index()] = Some(FileSet {
            name: base_name.to_string(),
            files,
        });
        Ok(())
    }

    pub fn set(&self, file_id: FileId) -> Option<&FileSet> {
        self.sets[file_id.index()].as_ref()
    }

    /// Closes one file and removes it from disk. Failures are logged, not
    /// fatal; a missing temp file never blocks plotting progress.
    pub fn remove_file(&mut self, file_id: FileId, bucket: u32) {
        let Some(set) = self.sets[file_id.index()].as_mut() else {
            tracing::error!(?file_id, bucket, "delete requested for unopened file set");
            return;
        };

        let name = set.name.clone();
        if let Some(slot) = set.files.get_mut(bucket as usize) {
            drop(slot.take());
        }

        let path = self.set_path(file_id, &name, bucket);
        if let Err(error) = std::fs::remove_file(&path) {
            tracing::error!(path = %path.display(), %error, "failed to delete work file");
        }
    }

    /// Closes and removes every file in the set. Same error policy as
    /// [`remove_file`](Self::remove_file).
    pub fn remove_set(&mut self, file_id: FileId) {
        let Some(set) = self.sets[file_id.index()].take() else {
            tracing::error!(?file_id, "delete requested for unopened file set");
            return;
        };

        for (bucket, file) in set.files.into_iter().enumerate() {
            drop(file);
            let path = self.set_path(file_id, &set.name, bucket as u32);
            if let Err(error) = std::fs::remove_file(&path) {
                tracing::error!(path = %path.display(), %error, "failed to delete work file");
            }
        }
    }

    fn set_path(&self, file_id: FileId, base_name: &str, bucket: u32) -> PathBuf {
        if file_id == FileId::Plot {
            self.work_dir.join(base_name)
        } else {
            self.work_dir.join(format!("{base_name}_{bucket}.tmp"))
        }
    }
}

fn open_work_file(path: &Path, direct_io: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);

    #[cfg(target_os = "linux")]
    if direct_io {
        use std::os::unix::fs::OpenOptionsExt;
        options.custom_flags(libc::O_DIRECT);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = direct_io;

    options.open(path)
}

#[cfg(unix)]
fn file_block_size(file: &File) -> Result<usize> {
    use std::os::unix::fs::MetadataExt;
    Ok(file.metadata()?.blksize() as usize)
}

#[cfg(not(unix))]
fn file_block_size(_file: &File) -> Result<usize> {
    Ok(FALLBACK_BLOCK_SIZE)
}

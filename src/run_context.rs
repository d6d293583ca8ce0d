//! Run numbering and run-directory layout.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{AcqError, Result};

/// A contiguous acquisition period: a unique, monotonically-increasing
/// run number and its dedicated output subdirectory
/// (`output_root/run<N>/{event,header,status,aux,cfg}`).
#[derive(Clone)]
pub struct RunContext {
    pub run_number: u64,
    pub run_dir: PathBuf,
}

impl RunContext {
    /// Read-increment-write the run-number file (write-then-rename to a
    /// temporary name, so a crash mid-write never corrupts the counter),
    /// then create this run's directory layout under `output_root`.
    pub fn begin(run_file: &Path, output_root: &Path) -> Result<Self> {
        let run_number = Self::read_increment_write(run_file)?;
        let run_dir = output_root.join(format!("run{run_number}"));

        for sub in ["event", "header", "status", "aux", "cfg"] {
            fs::create_dir_all(run_dir.join(sub))
                .map_err(|e| AcqError::directory(format!("mkdir {}/{sub} failed: {e}", run_dir.display())))?;
        }

        Ok(Self { run_number, run_dir })
    }

    fn read_increment_write(run_file: &Path) -> Result<u64> {
        let current: u64 = match fs::read_to_string(run_file) {
            Ok(text) => text.trim().parse().unwrap_or(0),
            Err(_) => 0,
        };
        let next = current + 1;

        let tmp_path = run_file.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)
                .map_err(|e| AcqError::directory(format!("create {} failed: {e}", tmp_path.display())))?;
            write!(tmp, "{next}")
                .map_err(|e| AcqError::directory(format!("write {} failed: {e}", tmp_path.display())))?;
            tmp.sync_all().map_err(|e| AcqError::directory(format!("fsync {} failed: {e}", tmp_path.display())))?;
        }
        fs::rename(&tmp_path, run_file)
            .map_err(|e| AcqError::directory(format!("rename {} failed: {e}", run_file.display())))?;

        Ok(next)
    }

    /// Rewrite the run-number file with the current run number, without
    /// incrementing it. Used on config reload, which re-persists the
    /// counter but does not start a new run.
    pub fn rewrite_run_file(&self, run_file: &Path) -> Result<()> {
        let tmp_path = run_file.with_extension("tmp");
        {
            let mut tmp = fs::File::create(&tmp_path)
                .map_err(|e| AcqError::directory(format!("create {} failed: {e}", tmp_path.display())))?;
            write!(tmp, "{}", self.run_number)
                .map_err(|e| AcqError::directory(format!("write {} failed: {e}", tmp_path.display())))?;
            tmp.sync_all().map_err(|e| AcqError::directory(format!("fsync {} failed: {e}", tmp_path.display())))?;
        }
        fs::rename(&tmp_path, run_file)
            .map_err(|e| AcqError::directory(format!("rename {} failed: {e}", run_file.display())))?;
        Ok(())
    }

    pub fn subdir(&self, kind: &str) -> PathBuf {
        self.run_dir.join(kind)
    }

    /// Stage a copy of each known config file into `cfg/` within the run
    /// directory.
    pub fn stage_config_copy(&self, config_path: &Path) -> Result<()> {
        if let Some(name) = config_path.file_name() {
            let dest = self.subdir("cfg").join(name);
            fs::copy(config_path, &dest)
                .map_err(|e| AcqError::directory(format!("copy config to {}: {e}", dest.display())))?;
        }
        Ok(())
    }

    /// Recursively copy each `:`-separated path in `copy_paths_to_rundir`
    /// into `aux/`.
    pub fn stage_aux_paths(&self, colon_separated_paths: &str) -> Result<()> {
        if colon_separated_paths.is_empty() {
            return Ok(());
        }
        let aux_dir = self.subdir("aux");
        for src in colon_separated_paths.split(':').filter(|s| !s.is_empty()) {
            let src_path = Path::new(src);
            let Some(name) = src_path.file_name() else { continue };
            copy_recursive(src_path, &aux_dir.join(name))?;
        }
        Ok(())
    }
}

fn copy_recursive(src: &Path, dest: &Path) -> Result<()> {
    let metadata = fs::metadata(src)
        .map_err(|e| AcqError::directory(format!("stat {} failed: {e}", src.display())))?;

    if metadata.is_dir() {
        fs::create_dir_all(dest).map_err(|e| AcqError::directory(format!("mkdir {} failed: {e}", dest.display())))?;
        for entry in fs::read_dir(src).map_err(|e| AcqError::directory(format!("readdir {} failed: {e}", src.display())))? {
            let entry = entry.map_err(|e| AcqError::directory(format!("readdir entry failed: {e}")))?;
            copy_recursive(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dest).map_err(|e| AcqError::directory(format!("copy {} -> {} failed: {e}", src.display(), dest.display())))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_number_increments_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let run_file = dir.path().join("run_number");
        let output_root = dir.path().join("data");

        let ctx1 = RunContext::begin(&run_file, &output_root).unwrap();
        assert_eq!(ctx1.run_number, 1);

        let ctx2 = RunContext::begin(&run_file, &output_root).unwrap();
        assert_eq!(ctx2.run_number, 2);
    }

    #[test]
    fn test_run_directory_layout_created() {
        let dir = tempfile::tempdir().unwrap();
        let run_file = dir.path().join("run_number");
        let output_root = dir.path().join("data");

        let ctx = RunContext::begin(&run_file, &output_root).unwrap();
        for sub in ["event", "header", "status", "aux", "cfg"] {
            assert!(ctx.subdir(sub).is_dir());
        }
    }

    #[test]
    fn test_run_file_survives_as_plain_integer() {
        let dir = tempfile::tempdir().unwrap();
        let run_file = dir.path().join("run_number");
        let output_root = dir.path().join("data");

        RunContext::begin(&run_file, &output_root).unwrap();
        let contents = fs::read_to_string(&run_file).unwrap();
        assert_eq!(contents.trim(), "1");
    }
}

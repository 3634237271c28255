use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::UtcOffset;

use super::epics_time::EpicsTime;
use super::error::HistorianError;
use super::historian::{window_samples, ChannelHandle, Historian};
use super::sample::{Sample, SampleSeries};

const ENTRIES_PER_LINE: usize = 2; // time, value
const COMMENT_MARKER: &str = "#";

/// FileArchive serves historian data from plain text exports on disk.
///
/// The layout is `<root>/<deployment>/<variable>.csv`. Each line holds a wall clock time
/// (`YYYY-MM-DD HH:MM:SS`, optionally with fractional seconds) and a value separated by a
/// comma. Blank lines and lines starting with `#` are skipped. Times are read at the archive's
/// UTC offset.
#[derive(Debug, Clone)]
pub struct FileArchive {
    root: PathBuf,
    time_offset: UtcOffset,
}

impl FileArchive {
    /// Open an archive rooted at `root`
    pub fn new(root: &Path, time_offset: UtcOffset) -> Result<Self, HistorianError> {
        if !root.is_dir() {
            return Err(HistorianError::BadArchivePath(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
            time_offset,
        })
    }

    /// Get the Path to the export of a variable
    pub fn channel_path(&self, name: &str, deployment: &str) -> PathBuf {
        self.root.join(deployment).join(format!("{name}.csv"))
    }

    /// Read the full record of a variable
    fn read_record(&self, path: &Path) -> Result<Vec<Sample>, HistorianError> {
        let mut contents = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut contents)?;

        let mut record: Vec<Sample> = Vec::new();
        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(COMMENT_MARKER) {
                continue;
            }
            let entries: Vec<&str> = line.split_terminator(",").collect();
            if entries.len() != ENTRIES_PER_LINE {
                return Err(HistorianError::BadEntry(path.to_path_buf(), idx + 1));
            }
            let timestamp = EpicsTime::parse(entries[0], self.time_offset)?;
            let value: f64 = entries[1]
                .trim()
                .parse()
                .map_err(|_| HistorianError::BadEntry(path.to_path_buf(), idx + 1))?;
            record.push(Sample::new(timestamp, value));
        }
        Ok(record)
    }
}

impl Historian for FileArchive {
    fn lookup(&self, name: &str, deployment: &str) -> Result<ChannelHandle, HistorianError> {
        let path = self.channel_path(name, deployment);
        if !path.exists() {
            return Err(HistorianError::UnknownChannel(
                name.to_string(),
                deployment.to_string(),
            ));
        }
        Ok(ChannelHandle {
            name: name.to_string(),
            deployment: deployment.to_string(),
            id: fxhash::hash64(&path),
        })
    }

    fn fetch(
        &self,
        handle: &ChannelHandle,
        start: EpicsTime,
        duration: f64,
    ) -> Result<SampleSeries, HistorianError> {
        let path = self.channel_path(&handle.name, &handle.deployment);
        let record = SampleSeries::new(self.read_record(&path)?)?;
        Ok(SampleSeries::new(window_samples(
            record.samples(),
            start,
            duration,
        ))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::historian::HandleCache;

    /// Write a small archive into a fresh temporary directory
    fn make_archive(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("epics_scan_archive_{tag}_{}", std::process::id()));
        let ops = root.join("ops");
        std::fs::create_dir_all(&ops).unwrap();
        std::fs::write(
            ops.join("IBCAD00CRCUR6.csv"),
            "# time,current\n\
             2018-09-01 00:00:00,100.0\n\
             2018-09-01 00:00:10.5,150.0\n\
             \n\
             2018-09-01 00:01:00,0.0\n",
        )
        .unwrap();
        std::fs::write(ops.join("BROKEN.csv"), "2018-09-01 00:00:00;100.0\n").unwrap();
        root
    }

    #[test]
    fn test_fetch_window() {
        let root = make_archive("fetch");
        let archive = FileArchive::new(&root, UtcOffset::UTC).unwrap();
        let mut cache = HandleCache::new();
        let handle = cache.resolve(&archive, "IBCAD00CRCUR6", "ops").unwrap();
        let start = EpicsTime::parse("2018-09-01 00:00:05", UtcOffset::UTC).unwrap();
        let series = archive.fetch(&handle, start, 30.0).unwrap();
        let values: Vec<f64> = series.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![100.0, 150.0]);
        assert_eq!(series.first().unwrap().timestamp, start);
        assert_eq!(series.last().unwrap().timestamp.seconds_since(start), 5.5);
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_unknown_and_broken_channels() {
        let root = make_archive("broken");
        let archive = FileArchive::new(&root, UtcOffset::UTC).unwrap();
        assert!(matches!(
            archive.lookup("IBCAD00CRCUR6", "history"),
            Err(HistorianError::UnknownChannel(_, _))
        ));
        let handle = archive.lookup("BROKEN", "ops").unwrap();
        assert!(matches!(
            archive.fetch(&handle, EpicsTime::default(), 1.0),
            Err(HistorianError::BadEntry(_, 1))
        ));
        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_missing_root() {
        let root = std::env::temp_dir().join("epics_scan_archive_does_not_exist");
        assert!(matches!(
            FileArchive::new(&root, UtcOffset::UTC),
            Err(HistorianError::BadArchivePath(_))
        ));
    }
}

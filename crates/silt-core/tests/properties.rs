use proptest::prelude::*;
use silt_core::{FileSystem, FsError};
use silt_fs::{DirEntry, DIRENT_SIZE};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

struct TempImage(PathBuf);

impl TempImage {
    fn new(tag: &str) -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "silt-property-{}-{}-{}.img",
            tag,
            std::process::id(),
            n
        ));
        let _ = std::fs::remove_file(&path);
        Self(path)
    }
}

impl Drop for TempImage {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever lands at a position reads back from it, regardless of how
    /// the file grew beforehand and where the write starts.
    #[test]
    fn write_read_round_trip(
        prefix in proptest::collection::vec(any::<u8>(), 0..2048),
        data in proptest::collection::vec(any::<u8>(), 1..4096),
        pos_seed in any::<usize>(),
    ) {
        let img = TempImage::new("roundtrip");
        let mut fs = FileSystem::boot(img.0.clone()).unwrap();
        fs.create_file("/f").unwrap();
        let fd = fs.open("/f").unwrap();

        if !prefix.is_empty() {
            prop_assert_eq!(fs.write(fd, &prefix).unwrap(), prefix.len());
        }
        let pos = pos_seed % (prefix.len() + 1);
        prop_assert_eq!(fs.seek(fd, pos).unwrap(), pos);
        prop_assert_eq!(fs.write(fd, &data).unwrap(), data.len());

        prop_assert_eq!(fs.seek(fd, pos).unwrap(), pos);
        let mut back = vec![0u8; data.len()];
        prop_assert_eq!(fs.read(fd, &mut back).unwrap(), data.len());
        prop_assert_eq!(&back, &data);

        // The size is the larger of the prefix and the write's end.
        let size = prefix.len().max(pos + data.len());
        prop_assert_eq!(fs.seek(fd, size).unwrap(), size);
        prop_assert_eq!(fs.seek(fd, size + 1), Err(FsError::SeekOutOfBounds));
    }

    /// Under any create/unlink churn the live dirents stay densely packed
    /// in slots [0, n), in exactly the order swap-with-last compaction
    /// produces.
    #[test]
    fn directory_stays_dense_under_churn(
        ops in proptest::collection::vec((any::<bool>(), 0u8..20), 1..40),
    ) {
        let img = TempImage::new("churn");
        let mut fs = FileSystem::boot(img.0.clone()).unwrap();
        let mut model: Vec<String> = Vec::new();

        for (create, seed) in ops {
            let name = format!("n{:02}", seed);
            let path = format!("/{}", name);
            if create {
                if model.contains(&name) {
                    prop_assert_eq!(fs.create_file(&path), Err(FsError::Create));
                } else {
                    fs.create_file(&path).unwrap();
                    model.push(name);
                }
            } else if let Some(at) = model.iter().position(|n| n == &name) {
                fs.remove_file(&path).unwrap();
                model.swap_remove(at);
            } else {
                prop_assert_eq!(fs.remove_file(&path), Err(FsError::NoSuchFile));
            }
        }

        let bytes = fs.dir_size("/").unwrap();
        prop_assert_eq!(bytes, model.len() * DIRENT_SIZE);
        let mut buf = vec![0u8; bytes];
        let count = fs.read_dir("/", &mut buf).unwrap();
        prop_assert_eq!(count, model.len());

        let names: Vec<String> = (0..count)
            .map(|i| {
                DirEntry::decode(&buf[i * DIRENT_SIZE..(i + 1) * DIRENT_SIZE])
                    .name_as_str()
                    .to_string()
            })
            .collect();
        prop_assert_eq!(names, model);
    }
}

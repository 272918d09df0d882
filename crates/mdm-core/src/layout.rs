//! On-disk naming for region files.
//!
//! The storage root holds one directory per data version; each version
//! directory holds the part files, the consumer-produced sidecar index and
//! any transfer artifacts:
//!
//! ```text
//! <root>/<version>/<region>.map          base part
//! <root>/<version>/<region>.map.aux      auxiliary part
//! <root>/<version>/<region>.idx          sidecar index
//! <root>/<version>/<file>.part           download-in-progress temp
//! <root>/<version>/<file>.resume         resumable-partial marker
//! ```

use crate::part::Part;
use std::path::{Path, PathBuf};

/// Suffix appended to a final path while the transfer is in progress.
pub const TEMP_SUFFIX: &str = ".part";

/// Marker next to the temp file holding the resumable byte offset.
pub const RESUME_SUFFIX: &str = ".resume";

/// Extension of the sidecar index produced by consumers of a completed region.
pub const INDEX_EXT: &str = "idx";

/// File name of one part for a region name stem.
pub fn part_file_name(name: &str, part: Part) -> String {
    match part {
        Part::Base => format!("{name}.map"),
        Part::Auxiliary => format!("{name}.map.aux"),
    }
}

/// Parses a file name back into (region name, part). Sidecars, transfer
/// artifacts and anything unrecognized yield `None`.
pub fn parse_part_file_name(file: &str) -> Option<(&str, Part)> {
    if file.ends_with(TEMP_SUFFIX) || file.ends_with(RESUME_SUFFIX) {
        return None;
    }
    if let Some(stem) = file.strip_suffix(".map.aux") {
        return Some((stem, Part::Auxiliary));
    }
    if let Some(stem) = file.strip_suffix(".map") {
        return Some((stem, Part::Base));
    }
    None
}

/// Sidecar index file name for a region name stem.
pub fn index_file_name(name: &str) -> String {
    format!("{name}.{INDEX_EXT}")
}

/// Directory holding all files of one data version.
pub fn version_dir(root: &Path, version: i64) -> PathBuf {
    root.join(version.to_string())
}

/// Final path of a part file.
pub fn part_path(root: &Path, version: i64, name: &str, part: Part) -> PathBuf {
    version_dir(root, version).join(part_file_name(name, part))
}

/// Temp path for a final path: `x.map` becomes `x.map.part`.
pub fn temp_path(final_path: &Path) -> PathBuf {
    append_suffix(final_path, TEMP_SUFFIX)
}

/// Resume marker path for a final path: `x.map` becomes `x.map.resume`.
pub fn resume_path(final_path: &Path) -> PathBuf {
    append_suffix(final_path, RESUME_SUFFIX)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(suffix);
    PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_file_names_roundtrip() {
        assert_eq!(part_file_name("uruguay", Part::Base), "uruguay.map");
        assert_eq!(part_file_name("uruguay", Part::Auxiliary), "uruguay.map.aux");

        assert_eq!(parse_part_file_name("uruguay.map"), Some(("uruguay", Part::Base)));
        assert_eq!(
            parse_part_file_name("uruguay.map.aux"),
            Some(("uruguay", Part::Auxiliary))
        );
    }

    #[test]
    fn artifacts_and_sidecars_are_not_parts() {
        assert_eq!(parse_part_file_name("uruguay.map.part"), None);
        assert_eq!(parse_part_file_name("uruguay.map.aux.part"), None);
        assert_eq!(parse_part_file_name("uruguay.map.resume"), None);
        assert_eq!(parse_part_file_name("uruguay.idx"), None);
        assert_eq!(parse_part_file_name("readme.txt"), None);
    }

    #[test]
    fn temp_and_resume_paths_append_suffix() {
        let final_path = Path::new("/data/20260801/uruguay.map");
        assert_eq!(
            temp_path(final_path).to_string_lossy(),
            "/data/20260801/uruguay.map.part"
        );
        assert_eq!(
            resume_path(final_path).to_string_lossy(),
            "/data/20260801/uruguay.map.resume"
        );
    }

    #[test]
    fn version_dir_and_part_path() {
        let root = Path::new("/data");
        assert_eq!(version_dir(root, 42).to_string_lossy(), "/data/42");
        assert_eq!(
            part_path(root, 42, "peru", Part::Auxiliary).to_string_lossy(),
            "/data/42/peru.map.aux"
        );
    }
}

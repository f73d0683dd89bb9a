//! Input pair lists and result CSV export.
//!
//! The legacy formats are deliberately naive: the input list is one
//! `fileOne,fileTwo` pair per comma-split line with no quoting, and the
//! export keeps the historical header (including its trailing separator)
//! so existing spreadsheets keep working.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Result CSV header. Kept byte-for-byte compatible with the legacy tool.
pub const CSV_HEADER: &str = "FileOne, FileTwo, PSNR, SSIMMean, SSIMMin, SSIMVariance, ManualCheck, ";

/// Parse an input pair list. Lines that do not split into exactly two
/// fields are skipped, not errors.
pub fn parse_pair_list<R: BufRead>(reader: R) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    let mut pairs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 2 {
            if !line.trim().is_empty() {
                tracing::debug!("Skipping malformed pair line: {:?}", line);
            }
            continue;
        }
        pairs.push((PathBuf::from(fields[0]), PathBuf::from(fields[1])));
    }
    Ok(pairs)
}

/// Load an input pair list from a file.
pub fn load_pair_file(path: &Path) -> std::io::Result<Vec<(PathBuf, PathBuf)>> {
    let file = std::fs::File::open(path)?;
    let pairs = parse_pair_list(BufReader::new(file))?;
    tracing::debug!("Loaded {} pairs from {:?}", pairs.len(), path);
    Ok(pairs)
}

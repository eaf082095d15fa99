use std::fs;
use std::path::Path;

// Read-only lookup into the collaborator-owned .env file. The file format
// belongs to the application; this side only ever needs single values for
// display, so parse failures and missing files all collapse to "absent".
pub fn read_env_key(path: &Path, key: &str) -> Option<String> {
    let raw = fs::read_to_string(path).ok()?;

    for line in raw.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((candidate_key, value)) = line.split_once('=') else {
            continue;
        };

        if candidate_key.trim() == key {
            return Some(value.trim().to_string());
        }
    }

    None
}

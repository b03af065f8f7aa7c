use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::types::ProjectDescriptor;

/// Directory holding bridge runtime files for a project.
pub fn unityctl_dir(project_root: &Path) -> PathBuf {
    project_root.join(".unityctl")
}

/// Path of the bridge descriptor file under a project root.
pub fn descriptor_path(project_root: &Path) -> PathBuf {
    unityctl_dir(project_root).join("bridge.json")
}

/// Path the editor plugin writes its log file to, tailed by the bridge.
pub fn editor_log_path(project_root: &Path) -> PathBuf {
    unityctl_dir(project_root).join("editor.log")
}

/// Write the descriptor atomically (temp file, then rename) so readers
/// never observe a partial file. The descriptor is intentionally left in
/// place on shutdown: the editor uses it to reconnect after a bridge
/// restart.
pub fn write_descriptor(project_root: &Path, descriptor: &ProjectDescriptor) -> io::Result<()> {
    let dir = unityctl_dir(project_root);
    fs::create_dir_all(&dir)?;

    let json = serde_json::to_string_pretty(descriptor)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let tmp = dir.join("bridge.json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, dir.join("bridge.json"))?;
    Ok(())
}

/// Read the descriptor if one exists. Missing or unparseable files are
/// `None` — both the CLI and the plugin must tolerate a stale or absent
/// descriptor.
pub fn read_descriptor(project_root: &Path) -> Option<ProjectDescriptor> {
    let contents = fs::read_to_string(descriptor_path(project_root)).ok()?;
    serde_json::from_str(&contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProjectDescriptor {
        ProjectDescriptor {
            project_id: "proj-0011aabb".to_string(),
            port: 49321,
            pid: 777,
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let root = tempfile::tempdir().unwrap();
        let desc = sample();
        write_descriptor(root.path(), &desc).unwrap();
        assert_eq!(read_descriptor(root.path()), Some(desc));
    }

    #[test]
    fn read_missing_descriptor_is_none() {
        let root = tempfile::tempdir().unwrap();
        assert_eq!(read_descriptor(root.path()), None);
    }

    #[test]
    fn read_corrupt_descriptor_is_none() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(unityctl_dir(root.path())).unwrap();
        fs::write(descriptor_path(root.path()), "{not json").unwrap();
        assert_eq!(read_descriptor(root.path()), None);
    }

    #[test]
    fn write_replaces_existing_descriptor() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(root.path(), &sample()).unwrap();

        let newer = ProjectDescriptor {
            port: 50000,
            ..sample()
        };
        write_descriptor(root.path(), &newer).unwrap();
        assert_eq!(read_descriptor(root.path()), Some(newer));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let root = tempfile::tempdir().unwrap();
        write_descriptor(root.path(), &sample()).unwrap();
        assert!(!unityctl_dir(root.path()).join("bridge.json.tmp").exists());
    }
}

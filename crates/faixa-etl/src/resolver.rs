//! Dataset file resolution
//!
//! Survey exports arrive as a loose directory of files whose names follow
//! no fixed convention. Each semantic role is matched by case-insensitive
//! name fragments; explicit overrides win over the heuristics.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use faixa_core::models::{DatasetFiles, FileRole};
use faixa_core::{FaixaError, Result};

/// Name fragments that identify a file's role, checked in order
fn patterns(role: FileRole) -> &'static [&'static str] {
    match role {
        FileRole::LineKml => &["linha", "tracado", "line"],
        FileRole::StructureKml => &["estrutura", "torre", "tower"],
        FileRole::TreatedKml => &["tratad", "manejo", "treated"],
        FileRole::VegetationCsv => &["vegetaca", "trees"],
        FileRole::VegetationRiskCsv => &["risco", "clearance"],
        FileRole::LateralRiskCsv => &["queda", "danger"],
        FileRole::CrossingsCsv => &["cruzamento", "cross"],
    }
}

fn extension(role: FileRole) -> &'static str {
    match role {
        FileRole::LineKml | FileRole::StructureKml | FileRole::TreatedKml => "kml",
        _ => "csv",
    }
}

/// Check that the dataset path exists and is a directory, returning it absolute
pub fn resolve_dataset_dir(path: &Path) -> Result<PathBuf> {
    let metadata = fs::metadata(path).map_err(|e| FaixaError::Path {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !metadata.is_dir() {
        return Err(FaixaError::Path {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    fs::canonicalize(path).map_err(|e| FaixaError::Path {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Match the files of `dir` to their roles.
///
/// Directory entries are scanned in name order and the first match per role
/// wins; roles without a match are absent. Overrides are joined to `dir`
/// unless already absolute.
pub fn resolve_files(dir: &Path, overrides: &BTreeMap<FileRole, PathBuf>) -> Result<DatasetFiles> {
    let mut entries: Vec<(String, PathBuf)> = fs::read_dir(dir)
        .map_err(|e| FaixaError::Path { path: dir.to_path_buf(), reason: e.to_string() })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| (entry.file_name().to_string_lossy().to_string(), entry.path()))
        .collect();
    entries.sort();

    let mut files = DatasetFiles::new();
    for role in FileRole::ALL {
        if let Some(path) = overrides.get(&role) {
            let path = if path.is_absolute() { path.clone() } else { dir.join(path) };
            files.insert(role, path);
            continue;
        }

        let found = entries.iter().find(|(name, _)| matches_role(role, name));
        match found {
            Some((name, path)) => {
                tracing::debug!(role = %role, file = %name, "Resolved dataset file");
                files.insert(role, path.clone());
            }
            None => tracing::debug!(role = %role, "No file matched"),
        }
    }

    Ok(files)
}

/// Whether a file name looks like the given role: a matching name fragment,
/// and the role's extension when the name has one of the survey extensions
fn matches_role(role: FileRole, name: &str) -> bool {
    let lower = name.to_lowercase();
    let ext = Path::new(&lower).extension().and_then(|e| e.to_str()).unwrap_or_default();
    if matches!(ext, "kml" | "csv") && ext != extension(role) {
        return false;
    }
    patterns(role).iter().any(|pattern| lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "").unwrap();
    }

    #[test]
    fn test_roles_matched_case_insensitively() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "LT500_Linha.KML");
        touch(dir.path(), "Torres.kml");
        touch(dir.path(), "area_tratada.kml");
        touch(dir.path(), "Cruzamentos.csv");
        touch(dir.path(), "notas.txt");

        let files = resolve_files(dir.path(), &BTreeMap::new()).unwrap();
        assert!(files.get(FileRole::LineKml).unwrap().ends_with("LT500_Linha.KML"));
        assert!(files.get(FileRole::StructureKml).unwrap().ends_with("Torres.kml"));
        assert!(files.get(FileRole::TreatedKml).unwrap().ends_with("area_tratada.kml"));
        assert!(files.get(FileRole::CrossingsCsv).unwrap().ends_with("Cruzamentos.csv"));
        assert!(!files.contains(FileRole::VegetationCsv));
        assert!(!files.contains(FileRole::LateralRiskCsv));
    }

    #[test]
    fn test_directories_are_ignored() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("linha_backup")).unwrap();

        let files = resolve_files(dir.path(), &BTreeMap::new()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_extension_separates_kml_from_csv() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "linha.csv");
        touch(dir.path(), "queda_lateral.csv");

        let files = resolve_files(dir.path(), &BTreeMap::new()).unwrap();
        assert!(!files.contains(FileRole::LineKml));
        assert!(files.contains(FileRole::LateralRiskCsv));
    }

    #[test]
    fn test_override_wins_and_is_relative_to_dir() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "estruturas.kml");
        touch(dir.path(), "postes.kml");

        let overrides = BTreeMap::from([
            (FileRole::StructureKml, PathBuf::from("postes.kml")),
            (FileRole::LineKml, PathBuf::from("/srv/levantamento/eixo.kml")),
        ]);
        let files = resolve_files(dir.path(), &overrides).unwrap();
        assert_eq!(files.get(FileRole::StructureKml).unwrap(), dir.path().join("postes.kml"));
        assert_eq!(files.get(FileRole::LineKml).unwrap(), Path::new("/srv/levantamento/eixo.kml"));
    }

    #[test]
    fn test_missing_directory_is_path_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nao_existe");
        assert!(matches!(resolve_dataset_dir(&missing), Err(FaixaError::Path { .. })));

        touch(dir.path(), "arquivo.csv");
        assert!(matches!(
            resolve_dataset_dir(&dir.path().join("arquivo.csv")),
            Err(FaixaError::Path { .. })
        ));
        assert!(resolve_dataset_dir(dir.path()).unwrap().is_absolute());
    }
}

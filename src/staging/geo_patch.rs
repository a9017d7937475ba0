use anyhow::Context;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MeshError;
use crate::utils::utils::{file_name_str, list_regular_files};

/// How gmsh geometry scripts are matched with the staged surface meshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingStrategy {
    /// `LV.geo` pairs with the staged file whose name has an `LV` token.
    #[default]
    ByName,
    /// Both lists sorted by file name and paired by position.
    SortedOrder,
}

/// Points every geometry script in `geo_dir` at its staged surface mesh by
/// rewriting the script's second line to `Merge "<path>";`.
///
/// Returns the (script, staged file) pairs that were written.
pub fn patch_geometry_scripts(
    geo_dir: &Path,
    workspace: &Path,
    strategy: PairingStrategy,
) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    let scripts: Vec<PathBuf> = list_regular_files(geo_dir)
        .with_context(|| format!("Could not list geometry scripts in {}", geo_dir.display()))?
        .into_iter()
        .filter(|p| p.extension().map_or(false, |e| e == "geo"))
        .collect();
    let staged = list_regular_files(workspace)?;
    debug!("Geometry scripts: {:?}", scripts);

    let pairs = match strategy {
        PairingStrategy::ByName => pair_by_name(&scripts, &staged)?,
        PairingStrategy::SortedOrder => pair_sorted(&scripts, &staged)?,
    };

    // every script is checked before the first one is rewritten
    let mut patched = Vec::with_capacity(pairs.len());
    for (script, mesh) in &pairs {
        let absolute = fs::canonicalize(mesh).map_err(|e| MeshError::io(mesh, e))?;
        let data = fs::read(script).map_err(|e| MeshError::io(script, e))?;
        patched.push((script, with_merge_line(script, &data, &absolute)?));
        debug!("{} -> {}", file_name_str(script), absolute.display());
    }
    for (script, data) in patched {
        fs::write(script, data).map_err(|e| MeshError::io(script, e))?;
    }
    info!("Patched {} geometry scripts", pairs.len());
    Ok(pairs)
}

fn name_tokens(path: &Path) -> Vec<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .split(|c| c == '_' || c == '-' || c == '.')
        .filter(|t| !t.is_empty())
        .collect()
}

fn pair_by_name(
    scripts: &[PathBuf],
    staged: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, MeshError> {
    let mut problems = Vec::new();
    let mut pairs = Vec::with_capacity(scripts.len());
    let mut claimed = vec![0usize; staged.len()];

    for script in scripts {
        let key = script.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let matches: Vec<usize> = staged
            .iter()
            .enumerate()
            .filter(|(_, s)| name_tokens(s).contains(&key))
            .map(|(i, _)| i)
            .collect();
        match matches.as_slice() {
            [i] => {
                claimed[*i] += 1;
                pairs.push((script.clone(), staged[*i].clone()));
            }
            [] => problems.push(format!("'{}' matches no staged file", key)),
            _ => problems.push(format!(
                "'{}' matches {} staged files",
                key,
                matches.len()
            )),
        }
    }
    for (i, count) in claimed.iter().enumerate() {
        match count {
            1 => {}
            0 => problems.push(format!("{} matches no script", file_name_str(&staged[i]))),
            n => problems.push(format!("{} matches {} scripts", file_name_str(&staged[i]), n)),
        }
    }

    if problems.is_empty() {
        Ok(pairs)
    } else {
        Err(MeshError::Pairing(problems.join("; ")))
    }
}

fn pair_sorted(
    scripts: &[PathBuf],
    staged: &[PathBuf],
) -> Result<Vec<(PathBuf, PathBuf)>, MeshError> {
    if scripts.len() != staged.len() {
        return Err(MeshError::Pairing(format!(
            "{} geometry scripts but {} staged files",
            scripts.len(),
            staged.len()
        )));
    }
    Ok(scripts.iter().cloned().zip(staged.iter().cloned()).collect())
}

/// Replaces line 2 of `script`, keeping every other byte.
/// Script contents with line 2 replaced by `Merge "<mesh>";`, keeping the
/// original line terminator.
fn with_merge_line(script: &Path, data: &[u8], mesh: &Path) -> Result<Vec<u8>, MeshError> {
    let first_end = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| MeshError::MalformedScript(script.to_path_buf()))?
        + 1;
    if first_end == data.len() {
        return Err(MeshError::MalformedScript(script.to_path_buf()));
    }

    let rest = &data[first_end..];
    let second_newline = rest.iter().position(|&b| b == b'\n');
    let (second_end, terminator): (usize, &[u8]) = match second_newline {
        Some(i) if i > 0 && rest[i - 1] == b'\r' => (first_end + i + 1, &b"\r\n"[..]),
        Some(i) => (first_end + i + 1, &b"\n"[..]),
        None => (data.len(), &b"\n"[..]),
    };

    let mut patched = Vec::with_capacity(data.len() + 64);
    patched.extend_from_slice(&data[..first_end]);
    patched.extend_from_slice(format!("Merge \"{}\";", mesh.display()).as_bytes());
    patched.extend_from_slice(terminator);
    patched.extend_from_slice(&data[second_end..]);
    Ok(patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dirs {
        geo: tempfile::TempDir,
        workspace: tempfile::TempDir,
    }

    fn patch(dirs: &Dirs, strategy: PairingStrategy) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
        patch_geometry_scripts(dirs.geo.path(), dirs.workspace.path(), strategy)
    }

    fn setup(scripts: &[(&str, &str)], staged: &[&str]) -> Dirs {
        let geo = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        for (name, body) in scripts {
            fs::write(geo.path().join(name), body).unwrap();
        }
        for name in staged {
            fs::write(workspace.path().join(name), "mesh").unwrap();
        }
        Dirs { geo, workspace }
    }

    fn merge_line(dirs: &Dirs, staged: &str) -> String {
        let path = fs::canonicalize(dirs.workspace.path().join(staged)).unwrap();
        format!("Merge \"{}\";", path.display())
    }

    #[test]
    fn test_by_name_rewrites_only_second_line() {
        let body = "// LV\nMerge \"old.vtk\";\nSurface Loop(1) = {1};\r\nVolume(1) = {1};";
        let dirs = setup(
            &[("LV.geo", body), ("RV.geo", "// RV\nMerge \"x\";\n")],
            &["Shooting_3_RV.vtk", "Shooting_3_LV.vtk"],
        );

        let pairs = patch(&dirs, PairingStrategy::ByName).unwrap();
        assert_eq!(pairs.len(), 2);

        let lv = fs::read_to_string(dirs.geo.path().join("LV.geo")).unwrap();
        let expected = format!(
            "// LV\n{}\nSurface Loop(1) = {{1}};\r\nVolume(1) = {{1}};",
            merge_line(&dirs, "Shooting_3_LV.vtk")
        );
        assert_eq!(lv, expected);

        let rv = fs::read_to_string(dirs.geo.path().join("RV.geo")).unwrap();
        assert_eq!(rv, format!("// RV\n{}\n", merge_line(&dirs, "Shooting_3_RV.vtk")));
    }

    #[test]
    fn test_crlf_terminator_and_missing_final_newline() {
        let dirs = setup(
            &[("LA.geo", "a\r\nb\r\nc\r\n"), ("RA.geo", "a\nb")],
            &["Shooting_0_LA.vtk", "Shooting_0_RA.vtk"],
        );
        patch(&dirs, PairingStrategy::ByName).unwrap();

        let la = fs::read_to_string(dirs.geo.path().join("LA.geo")).unwrap();
        assert_eq!(la, format!("a\r\n{}\r\nc\r\n", merge_line(&dirs, "Shooting_0_LA.vtk")));
        let ra = fs::read_to_string(dirs.geo.path().join("RA.geo")).unwrap();
        assert_eq!(ra, format!("a\n{}\n", merge_line(&dirs, "Shooting_0_RA.vtk")));
    }

    #[test]
    fn test_by_name_ignores_sort_order_mismatch() {
        // Sorted positionally this would pair LV.geo with Shooting_1_A_RV.vtk.
        let dirs = setup(
            &[("LV.geo", "x\ny\n"), ("RV.geo", "x\ny\n")],
            &["Shooting_1_A_RV.vtk", "Shooting_1_B_LV.vtk"],
        );
        let pairs = patch(&dirs, PairingStrategy::ByName).unwrap();
        for (script, staged) in pairs {
            let key = script.file_stem().unwrap().to_str().unwrap().to_string();
            assert!(file_name_str(&staged).contains(&key));
        }
    }

    #[test]
    fn test_by_name_unmatched_script_fails() {
        let dirs = setup(
            &[("LV.geo", "x\ny\n"), ("AO.geo", "x\ny\n")],
            &["Shooting_1_LV.vtk", "Shooting_1_RV.vtk"],
        );
        let err = patch(&dirs, PairingStrategy::ByName).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'AO' matches no staged file"));
        assert!(message.contains("Shooting_1_RV.vtk matches no script"));
        // nothing is patched on failure
        assert_eq!(fs::read_to_string(dirs.geo.path().join("LV.geo")).unwrap(), "x\ny\n");
    }

    #[test]
    fn test_by_name_ambiguous_key_fails() {
        let dirs = setup(
            &[("LV.geo", "x\ny\n")],
            &["Shooting_1_LV.vtk", "Shooting_1_LV_wall.vtk"],
        );
        let err = patch(&dirs, PairingStrategy::ByName).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MeshError>(),
            Some(MeshError::Pairing(_))
        ));
    }

    #[test]
    fn test_sorted_order_pairs_by_position() {
        let dirs = setup(
            &[("b.geo", "x\ny\n"), ("a.geo", "x\ny\n"), ("notes.txt", "skip")],
            &["2.vtk", "1.vtk"],
        );
        let pairs = patch(&dirs, PairingStrategy::SortedOrder).unwrap();
        let names: Vec<(&str, &str)> = pairs
            .iter()
            .map(|(s, m)| (file_name_str(s), file_name_str(m)))
            .collect();
        assert_eq!(names, vec![("a.geo", "1.vtk"), ("b.geo", "2.vtk")]);
        assert_eq!(fs::read_to_string(dirs.geo.path().join("notes.txt")).unwrap(), "skip");
    }

    #[test]
    fn test_sorted_order_count_mismatch_fails() {
        let dirs = setup(&[("a.geo", "x\ny\n")], &["1.vtk", "2.vtk"]);
        assert!(patch(&dirs, PairingStrategy::SortedOrder).is_err());
    }

    #[test]
    fn test_single_line_script_is_malformed() {
        for body in ["only one line\n", "no newline"] {
            let dirs = setup(&[("LV.geo", body)], &["Shooting_1_LV.vtk"]);
            let err = patch(&dirs, PairingStrategy::ByName).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MeshError>(),
                Some(MeshError::MalformedScript(_))
            ));
        }
    }

    #[test]
    fn test_malformed_script_leaves_every_script_untouched() {
        // AO sorts before LV, so its rewrite would come first
        let dirs = setup(
            &[("AO.geo", "x\ny\n"), ("LV.geo", "only one line\n")],
            &["Shooting_1_AO.vtk", "Shooting_1_LV.vtk"],
        );
        let err = patch(&dirs, PairingStrategy::ByName).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MeshError>(),
            Some(MeshError::MalformedScript(_))
        ));
        assert_eq!(fs::read_to_string(dirs.geo.path().join("AO.geo")).unwrap(), "x\ny\n");
    }
}

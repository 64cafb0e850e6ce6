use super::VARIANTS;
use crate::model::TargetInstall;
use std::path::Path;

/// Variants whose data directory exists under `root`, in variant order.
pub fn detect_installs(root: &Path) -> Vec<TargetInstall> {
    VARIANTS
        .iter()
        .filter_map(|variant| {
            let path = root.join(variant.dir_name);
            path.is_dir().then(|| TargetInstall {
                id: variant.id.to_string(),
                name: variant.name.to_string(),
                path,
            })
        })
        .collect()
}

use crate::config::config_dir;
use std::path::PathBuf;
use tracing::debug;

pub(crate) fn default_functions_path() -> Option<PathBuf> {
    let mut path = config_dir()?;
    path.push("default.rhai");
    Some(path)
}

pub(crate) fn prepend_default_functions_if_present(
    functions: &mut Vec<PathBuf>,
    no_default_functions: bool,
) {
    if no_default_functions {
        return;
    }
    let Some(path) = default_functions_path() else {
        return;
    };
    if path.is_file() {
        functions.insert(0, path);
    } else {
        debug!(path = %path.display(), "no default functions file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_functions_path_is_deterministic() {
        assert_eq!(default_functions_path(), default_functions_path());
    }

    #[test]
    fn opt_out_leaves_list_alone() {
        let mut functions = vec![PathBuf::from("mine.rhai")];
        prepend_default_functions_if_present(&mut functions, true);
        assert_eq!(functions, vec![PathBuf::from("mine.rhai")]);
    }
}

//! Storage keys are always `/`-separated, whatever the host separator is.

use std::path::{MAIN_SEPARATOR, Path};

/// Renders a host path with forward slashes.
pub fn to_slash<P: AsRef<Path>>(path: P) -> String {
    let out = path.as_ref().to_string_lossy().into_owned();

    if MAIN_SEPARATOR != '/' {
        out.replace(MAIN_SEPARATOR, "/")
    } else {
        out
    }
}

/// Lexically cleans a `/`-separated path: repeated separators collapse, `.`
/// segments vanish and `..` consumes the previous segment where there is one.
///
/// Unlike a filesystem clean the empty path stays empty instead of becoming
/// `.`, since an empty key prefix means the bucket root.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if rooted => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let joined = segments.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

/// Joins path parts with `/` and cleans the result. Empty parts are skipped.
pub fn join_path<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref().replace(MAIN_SEPARATOR, "/"))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    clean(&joined)
}

/// Re-roots a key that would climb out of the destination prefix. Leading
/// `../` segments and a leading `/` are dropped rather than rejected.
pub fn clamp(remote: &str) -> String {
    let mut remote = remote;

    loop {
        if let Some(rest) = remote.strip_prefix("../") {
            remote = rest;
        } else if let Some(rest) = remote.strip_prefix('/') {
            remote = rest;
        } else if remote == ".." {
            remote = "";
        } else {
            break;
        }
    }

    remote.to_string()
}

/// Links inside rewritten HTML always point at the bucket root.
pub fn format_href(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// `path` relative to `base`, `/`-separated. Both sides are cleaned first, so
/// `./` and the empty path both name the current directory. Falls back to
/// `path` itself when the two cannot be related (one absolute, the other not).
pub fn relative_path<B: AsRef<Path>, P: AsRef<Path>>(base: B, path: P) -> String {
    let base = clean(&to_slash(base));
    let path = clean(&to_slash(path));

    match pathdiff::diff_paths(&path, &base) {
        Some(rel) => clean(&to_slash(rel)),
        None => path,
    }
}

/// Key of `remote` relative to the `dest` prefix.
pub fn relative_key(dest: &str, remote: &str) -> String {
    let dest = clean(dest.trim_start_matches('/'));
    let remote = clean(remote.trim_start_matches('/'));

    if dest.is_empty() {
        return remote;
    }

    match remote.strip_prefix(&dest) {
        Some("") => String::new(),
        Some(rest) if rest.starts_with('/') => rest[1..].to_string(),
        _ => relative_path(&dest, &remote),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_cleans_and_skips_empty_parts() {
        assert_eq!(join_path(&["site", "", "css/../js", "app.js"]), "site/js/app.js");
        assert_eq!(join_path(&["./", "index.html"]), "index.html");
        assert_eq!(join_path(&["./"]), "");
        assert_eq!(join_path(&["root", "/style.css"]), "root/style.css");
    }

    #[test]
    fn clean_keeps_leading_parent_segments_of_relative_paths() {
        assert_eq!(clean("../../assets/logo.png"), "../../assets/logo.png");
        assert_eq!(clean("/../x"), "/x");
        assert_eq!(clean("a/b/../../.."), "..");
    }

    #[test]
    fn clamp_strips_escaping_prefixes() {
        assert_eq!(clamp("../../assets/logo.png"), "assets/logo.png");
        assert_eq!(clamp("/site/app.js"), "site/app.js");
        assert_eq!(clamp("site/../x"), "site/../x");
    }

    #[test]
    fn clamped_key_stays_under_destination() {
        let remote = join_path(&["site", clamp("../../assets/logo.png").as_str()]);
        assert_eq!(remote, "site/assets/logo.png");
    }

    #[test]
    fn format_href_roots_paths() {
        assert_eq!(format_href("site/abc_app.js"), "/site/abc_app.js");
        assert_eq!(format_href("/already"), "/already");
    }

    #[test]
    fn relative_key_strips_destination() {
        assert_eq!(relative_key("site", "site/css/a.css"), "css/a.css");
        assert_eq!(relative_key("", "css/a.css"), "css/a.css");
        assert_eq!(relative_key("./", "/a.css"), "a.css");
        assert_eq!(relative_key("site", "other/a.css"), "../other/a.css");
    }

    #[test]
    fn relative_path_from_current_directory() {
        assert_eq!(relative_path("./", ""), "");
        assert_eq!(relative_path("./", "blog"), "blog");
        assert_eq!(relative_path(".", "./blog/post.html"), "blog/post.html");
        assert_eq!(relative_path("/srv/site", "/srv/site/blog"), "blog");
        assert_eq!(relative_path("/srv/site", "/srv/site"), "");
    }
}

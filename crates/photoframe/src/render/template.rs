//! Placeholder expansion for screen locations
//!
//! Supported placeholders: `{HH}` and `{mm}` (zero padded hour and minute),
//! `{H}` and `{m}` (unpadded), `{cwd}` (current directory). Anything else is
//! left as written.

use chrono::Timelike;
use std::path::Path;

/// Expand placeholders against the local clock and working directory
pub fn expand(input: &str) -> String {
    let cwd = std::env::current_dir().unwrap_or_default();
    expand_at(input, &chrono::Local::now(), &cwd)
}

pub fn expand_at(input: &str, time: &impl Timelike, cwd: &Path) -> String {
    if !input.contains('{') {
        return input.to_string();
    }

    input
        .replace("{HH}", &format!("{:02}", time.hour()))
        .replace("{H}", &time.hour().to_string())
        .replace("{mm}", &format!("{:02}", time.minute()))
        .replace("{m}", &time.minute().to_string())
        .replace("{cwd}", &cwd.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_expand_time() {
        let time = NaiveTime::from_hms_opt(7, 5, 0).unwrap();
        let cwd = Path::new("/srv/frame");

        assert_eq!(expand_at("{HH}:{mm}", &time, cwd), "07:05");
        assert_eq!(expand_at("{H}h{m}", &time, cwd), "7h5");
        assert_eq!(
            expand_at("{cwd}/img/{HH}.jpg", &time, cwd),
            "/srv/frame/img/07.jpg"
        );
    }

    #[test]
    fn test_unknown_placeholders_kept() {
        let time = NaiveTime::from_hms_opt(12, 30, 0).unwrap();
        assert_eq!(
            expand_at("{weather}.png", &time, Path::new("/")),
            "{weather}.png"
        );
        assert_eq!(expand_at("plain.jpg", &time, Path::new("/")), "plain.jpg");
    }
}

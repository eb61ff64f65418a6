use console::style;

/// Print success message
pub fn success(msg: &str) {
    println!("{} {}", style("✔").green(), msg);
}

/// Print error message
pub fn error(msg: &str) {
    println!("{} {}", style("✖").red(), msg);
}

/// Print info message (indented)
pub fn info(msg: &str) {
    println!("  {}", msg);
}

pub fn header(msg: &str) {
    println!();
    println!("  {}", style(msg).bold());
    println!();
}

/// Render a 0-100 level as a fixed-width bar.
pub fn level_bar(level: i32) -> String {
    let filled = (level.clamp(0, 100) / 10) as usize;
    format!(
        "{}{} {:>3}",
        style("█".repeat(filled)).green(),
        style("░".repeat(10 - filled)).dim(),
        level
    )
}

/// Signed level change, colored by direction.
pub fn delta(old: i32, new: i32) -> String {
    let diff = new - old;
    match diff.signum() {
        1 => style(format!("+{diff}")).green().to_string(),
        -1 => style(format!("{diff}")).red().to_string(),
        _ => style("±0".to_string()).dim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_bar_clamps() {
        console::set_colors_enabled(false);
        assert_eq!(level_bar(35), "███░░░░░░░  35");
        assert_eq!(level_bar(140), "██████████ 140");
        assert_eq!(level_bar(-3), "░░░░░░░░░░  -3");
    }

    #[test]
    fn test_delta_sign() {
        console::set_colors_enabled(false);
        assert_eq!(delta(40, 50), "+10");
        assert_eq!(delta(40, 35), "-5");
        assert_eq!(delta(0, 0), "±0");
    }
}

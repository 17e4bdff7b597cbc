//! Placeholder substitution for step messages and command lines

/// Render the value an action substitutes for its placeholder
///
/// Rounded values are rendered without a fractional part.
pub fn format_value(value: f64, round: bool) -> String {
    if round {
        format!("{}", value.round() as i64)
    } else {
        format!("{}", value)
    }
}

/// Replace every occurrence of `placeholder` in `text`
pub fn render(text: &str, placeholder: &str, value: &str) -> String {
    text.replace(placeholder, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(50.0, true), "50");
        assert_eq!(format_value(4.62, true), "5");
        assert_eq!(format_value(-0.4, true), "0");
        assert_eq!(format_value(4.5, false), "4.5");
        assert_eq!(format_value(50.0, false), "50");
    }

    #[test]
    fn test_render_custom_placeholder() {
        assert_eq!(render("You've got mail: {value}", "{value}", "7"), "You've got mail: 7");
        assert_eq!(render("set %% and %%", "%%", "3"), "set 3 and 3");
        assert_eq!(render("no token", "{value}", "3"), "no token");
    }
}

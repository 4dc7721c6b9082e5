//! Display routing decision.

/// Whether an inbound notification should be displayed.
///
/// A notification without a body is never displayed. Otherwise it is shown
/// unless the app is in the foreground with foreground display disabled.
pub fn should_display(has_body: bool, foreground_display_enabled: bool, is_app_foreground: bool) -> bool {
    has_body && (foreground_display_enabled || !is_app_foreground)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truth_table() {
        let cases = [
            // (has_body, enabled, foreground) -> display
            ((false, false, false), false),
            ((false, false, true), false),
            ((false, true, false), false),
            ((false, true, true), false),
            ((true, false, false), true),
            ((true, false, true), false),
            ((true, true, false), true),
            ((true, true, true), true),
        ];

        for ((has_body, enabled, foreground), expected) in cases {
            assert_eq!(
                should_display(has_body, enabled, foreground),
                expected,
                "has_body={has_body} enabled={enabled} foreground={foreground}"
            );
        }
    }
}

//! Snapshot testing helpers on top of [`expect_test`].

pub mod debug;
pub mod json;

use expect_test::Expect;

/// Approximate number of characters that can fit on a single screen
const COMMON_SCREEN_CHARS_WIDTH: usize = 60;

#[derive(Clone, Copy)]
enum Style {
    Terse,
    Verbose,
}

trait SnapshotFormat<T: ?Sized> {
    fn make_snapshot_imp(style: Style, actual: &T) -> String;

    /// Uses the terse style unless one of its lines exceeds the screen width.
    fn make_snapshot(actual: &T) -> String {
        let terse = Self::make_snapshot_imp(Style::Terse, actual);

        let Some(width) = terse.lines().map(str::len).max() else {
            return terse;
        };

        if width >= COMMON_SCREEN_CHARS_WIDTH {
            return Self::make_snapshot_imp(Style::Verbose, actual);
        }

        terse
    }

    #[track_caller]
    fn assert_eq(actual: &T, expected: &Expect) {
        expected.assert_eq(&Self::make_snapshot(actual));
    }

    #[track_caller]
    fn assert_result_eq<E>(actual: &Result<T, E>, expected: &Expect)
    where
        T: Sized,
        E: std::error::Error,
    {
        let snapshot = match actual {
            Ok(actual) => Self::make_snapshot(actual),
            Err(err) => format!("Err: {}", debug::make_snapshot(err.to_string())),
        };
        expected.assert_eq(&snapshot);
    }
}

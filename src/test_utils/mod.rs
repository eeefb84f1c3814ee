//! Shared test utilities: fixture corpus, stand-in retrievers, table checks.

pub mod fixtures;
pub mod logging;

pub use logging::TestLogger;

use std::fmt::Debug;

/// One row of a table-driven test.
#[derive(Debug, Clone)]
pub struct TableCase<I, E> {
    pub name: &'static str,
    pub input: I,
    pub expected: E,
}

/// Build a table row.
pub fn case<I, E>(name: &'static str, input: I, expected: E) -> TableCase<I, E> {
    TableCase {
        name,
        input,
        expected,
    }
}

/// Run `check` on every row and fail once with every mismatching row listed.
pub fn check_table<I, E, F>(cases: &[TableCase<I, E>], check: F)
where
    I: Debug,
    E: Debug + PartialEq,
    F: Fn(&I) -> E,
{
    let failures: Vec<String> = cases
        .iter()
        .filter_map(|case| {
            let actual = check(&case.input);
            tracing::debug!(case = case.name, input = ?case.input, actual = ?actual, "table case");
            (actual != case.expected).then(|| {
                format!(
                    "  {}: input {:?} expected {:?}, got {:?}",
                    case.name, case.input, case.expected, actual
                )
            })
        })
        .collect();

    assert!(
        failures.is_empty(),
        "{} of {} table cases failed:\n{}",
        failures.len(),
        cases.len(),
        failures.join("\n")
    );
}

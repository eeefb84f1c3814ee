use std::time::Instant;

use crate::search::engine::SearchResponse;
use crate::search::retriever::RetrieverStatus;

/// Prints a bracketed trace of a test scenario to stdout.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        let separator = "=".repeat(60);
        println!("\n{separator}");
        println!("[TEST START] {test_name}");
        println!("{separator}");
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn log_input<T: std::fmt::Debug>(&self, name: &str, value: &T) {
        println!("[INPUT] {name}: {value:?}");
    }

    /// Ranked ids with scores, then one line per retriever.
    pub fn log_response(&self, response: &SearchResponse) {
        println!(
            "[RESPONSE] query={:?} degraded={} amount_intent={}",
            response.query, response.degraded, response.amount_intent.triggered
        );
        for result in &response.results {
            let boost = if result.boost_applied() { " +boost" } else { "" };
            println!(
                "[RANK {:>2}] {:<16} {:.4}{boost}",
                result.rank, result.entry_id, result.score
            );
        }
        for report in &response.retrievers {
            match &report.status {
                RetrieverStatus::Completed {
                    returned,
                    elapsed_ms,
                } => println!("[RETRIEVER] {} returned {returned} in {elapsed_ms}ms", report.name),
                RetrieverStatus::Unavailable { reason } => {
                    println!("[RETRIEVER] {} unavailable: {reason}", report.name);
                }
            }
        }
    }

    pub fn pass(&self) {
        let elapsed = self.start_time.elapsed();
        println!("[RESULT] {} PASSED in {elapsed:?}", self.test_name);
        println!("{}\n", "=".repeat(60));
    }
}

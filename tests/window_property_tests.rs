//! Property-based tests for context window bookkeeping.

use omni_context::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Add { id: u8, bytes: usize, priority: u32 },
    Remove { id: u8 },
    Touch { id: u8 },
    Compress,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..12, 1usize..1200, 0u32..5).prop_map(|(id, bytes, priority)| Op::Add { id, bytes, priority }),
        1 => (0u8..12).prop_map(|id| Op::Remove { id }),
        1 => (0u8..12).prop_map(|id| Op::Touch { id }),
        1 => Just(Op::Compress),
    ]
}

fn config(auto_compress: bool) -> WindowConfig {
    WindowConfig {
        max_tokens: 1000,
        reserved_tokens: 200,
        compression_threshold: 0.8,
        auto_compress,
    }
}

fn check_totals(window: &ContextWindow) -> Result<(), TestCaseError> {
    let sum: usize = window.entries().iter().map(|e| e.tokens).sum();
    prop_assert_eq!(window.total_tokens(), sum);
    prop_assert!(window.total_tokens() <= window.available_tokens());
    prop_assert_eq!(window.remaining_tokens(), window.available_tokens() - window.total_tokens());
    prop_assert!(window.utilization() <= 1.0);
    Ok(())
}

proptest! {
    #[test]
    fn prop_total_matches_entries_and_fits_budget(
        auto_compress in any::<bool>(),
        ops in prop::collection::vec(op(), 1..60),
    ) {
        let mut window = ContextWindow::new(config(auto_compress));

        for op in ops {
            match op {
                Op::Add { id, bytes, priority } => {
                    let before = window.total_tokens();
                    let entries_before = window.len();
                    match window.add_snippet(format!("s{}", id), "x".repeat(bytes), priority) {
                        Ok(outcome) => {
                            prop_assert!(window.contains(&outcome.id));
                            prop_assert_eq!(outcome.tokens, estimate_tokens(&"x".repeat(bytes)));
                            prop_assert!(outcome.evicted.iter().all(|e| !window.contains(e)));
                        }
                        Err(_) => {
                            // Failed adds leave the window untouched
                            prop_assert_eq!(window.total_tokens(), before);
                            prop_assert_eq!(window.len(), entries_before);
                        }
                    }
                }
                Op::Remove { id } => {
                    window.remove(&format!("s{}", id));
                }
                Op::Touch { id } => {
                    window.get(&format!("s{}", id));
                }
                Op::Compress => {
                    window.compress();
                    prop_assert!(window.utilization() <= 0.8);
                }
            }
            check_totals(&window)?;
        }
    }

    #[test]
    fn prop_eviction_spares_higher_priority(
        low in prop::collection::vec(100usize..400, 1..6),
        high_bytes in 100usize..800,
    ) {
        let mut window = ContextWindow::new(config(true));
        let kept = window.add_snippet("high", "h".repeat(high_bytes), 10).unwrap();
        prop_assert!(kept.evicted.is_empty());

        for (i, bytes) in low.iter().enumerate() {
            let outcome = window.add_snippet(format!("low{}", i), "l".repeat(*bytes * 4), 1);
            if let Ok(outcome) = outcome {
                prop_assert!(outcome.evicted.iter().all(|e| e != "high"));
            }
            prop_assert!(window.contains("high"));
        }
    }
}

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use serde_json::json;

use signaldesk_common::Signal;
use signaldesk_engine::store::SignalStore;
use signaldesk_engine::stream::LineReassembler;

fn reassemble(bytes: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    cuts.push(0);
    cuts.push(bytes.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut reassembler = LineReassembler::new();
    let mut lines = Vec::new();
    for window in cuts.windows(2) {
        lines.extend(reassembler.feed(&bytes[window[0]..window[1]]));
    }
    lines.extend(reassembler.close());
    lines
}

fn line_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("{\"type\":\"log\",\"message\":\"".to_string()),
            Just("\"}".to_string()),
            Just("é".to_string()),
            Just("数据".to_string()),
            Just("🚀".to_string()),
            "[a-z ]{0,6}",
        ],
        0..6,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn reassembly_is_partition_independent(
        lines in prop::collection::vec(line_text(), 0..8),
        trailing_newline in any::<bool>(),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut body = lines.join("\n");
        if trailing_newline {
            body.push('\n');
        }
        let bytes = body.as_bytes();

        let whole = reassemble(bytes, &[]);
        let split = reassemble(bytes, &cuts);

        prop_assert_eq!(&split, &whole);
        prop_assert!(split.iter().all(|l| !l.contains('\u{FFFD}')), "split output contains U+FFFD");
    }

    #[test]
    fn byte_at_a_time_matches_whole(lines in prop::collection::vec(line_text(), 1..5)) {
        let body = format!("{}\n", lines.join("\n"));
        let bytes = body.as_bytes();
        let every_byte: Vec<usize> = (0..bytes.len()).collect();

        prop_assert_eq!(reassemble(bytes, &every_byte), lines);
    }

    #[test]
    fn merge_never_duplicates_and_last_write_wins(
        batches in prop::collection::vec(
            prop::collection::vec((0u8..12, any::<u16>()), 0..10),
            1..6,
        ),
    ) {
        let mut store = SignalStore::new();
        let mut latest: HashMap<String, u16> = HashMap::new();

        for batch in &batches {
            let signals: Vec<Signal> = batch
                .iter()
                .map(|(id, version)| {
                    Signal::from_value(json!({
                        "signal_id": format!("SIG-{id}"),
                        "version": version,
                    }))
                    .unwrap()
                })
                .collect();
            for (id, version) in batch {
                latest.insert(format!("SIG-{id}"), *version);
            }
            store.merge_insert(signals);

            let ids = store.all_ids();
            let unique: HashSet<&String> = ids.iter().collect();
            prop_assert_eq!(unique.len(), ids.len());
        }

        prop_assert_eq!(store.count(), latest.len());
        for (id, version) in &latest {
            let stored = store.get(id).and_then(|s| s.field("version")).cloned();
            prop_assert_eq!(stored, Some(json!(version)));
        }
    }
}

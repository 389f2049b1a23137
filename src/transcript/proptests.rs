//! Property-based tests for the transcript reducer
//!
//! - plain deltas concatenate verbatim
//! - annotated deltas append only their markers
//! - one citation entry per resolvable annotation
//! - blocks open exactly on start or on text with no open block
//! - replaying updates reproduces the finished blocks

use super::{reduce, Annotation, ContentBlock, Event, ReducerOptions, TurnUpdate, Usage};
use super::{CitationFormat, UsagePlacement};
use crate::assistant::testing::MockFileRegistry;
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn registry() -> MockFileRegistry {
    MockFileRegistry::new()
        .with_file("f0", "zero.pdf")
        .with_file("f1", "one.pdf")
        .with_file("f2", "two.pdf")
}

fn run(events: Vec<Event>, options: ReducerOptions) -> (Vec<String>, Vec<TurnUpdate>) {
    let mut updates = Vec::new();
    let stream = futures::stream::iter(events.into_iter().map(Ok));
    let turn = block_on(reduce(
        stream,
        &registry(),
        options,
        &CancellationToken::new(),
        |u| updates.push(u),
    ))
    .unwrap();
    let texts = turn
        .blocks
        .iter()
        .filter_map(ContentBlock::as_text)
        .map(ToString::to_string)
        .collect();
    (texts, updates)
}

/// Blocks a reducer must open: one per start, plus one whenever text or a
/// citation list arrives while no block is open
fn expected_opens(events: &[Event]) -> usize {
    let mut open = false;
    let mut opens = 0;
    for event in events {
        match event {
            Event::MessageStarted => {
                opens += 1;
                open = true;
            }
            Event::MessageDelta { text, annotations } => {
                let has_text = !annotations.is_empty() || !text.is_empty();
                if has_text && !open {
                    opens += 1;
                    open = true;
                }
            }
            Event::MessageCompleted { annotations } => {
                if !annotations.is_empty() && !open {
                    opens += 1;
                }
                open = false;
            }
            Event::StepUsageReported { .. } => {}
        }
    }
    opens
}

// ============================================================================
// Strategies
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?\n]{0,30}"
}

/// Annotation citing a known file, an unknown file, or nothing
fn arb_annotation() -> impl Strategy<Value = Annotation> {
    (
        0usize..20,
        prop_oneof![
            Just(None),
            Just(Some("missing".to_string())),
            (0..3u8).prop_map(|n| Some(format!("f{n}"))),
        ],
    )
        .prop_map(|(index, file_citation)| Annotation {
            index,
            file_citation,
        })
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        2 => Just(Event::MessageStarted),
        6 => arb_text().prop_map(Event::delta),
        2 => (arb_text(), proptest::collection::vec(arb_annotation(), 1..4))
            .prop_map(|(text, annotations)| Event::MessageDelta { text, annotations }),
        1 => proptest::collection::vec(arb_annotation(), 0..4).prop_map(Event::completed),
        1 => (0u64..1000, 0u64..1000).prop_map(|(prompt_tokens, completion_tokens)| {
            Event::StepUsageReported {
                usage: Usage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                },
            }
        }),
    ]
}

fn arb_options() -> impl Strategy<Value = ReducerOptions> {
    (
        any::<bool>(),
        prop_oneof![Just(CitationFormat::Inline), Just(CitationFormat::Bulleted)],
        prop_oneof![Just(UsagePlacement::Interleaved), Just(UsagePlacement::Trailing)],
    )
        .prop_map(|(print_usage, citation_format, usage_placement)| ReducerOptions {
            print_usage,
            citation_format,
            usage_placement,
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn plain_deltas_concatenate(texts in proptest::collection::vec(arb_text(), 0..20)) {
        let mut events = vec![Event::MessageStarted];
        events.extend(texts.iter().cloned().map(Event::delta));
        events.push(Event::completed(vec![]));

        let (blocks, _) = run(events, ReducerOptions::default());
        prop_assert_eq!(blocks, vec![texts.concat()]);
    }

    #[test]
    fn annotated_delta_appends_only_markers(
        prefix in arb_text(),
        text in arb_text(),
        annotations in proptest::collection::vec(arb_annotation(), 1..6),
    ) {
        let expected: String = annotations
            .iter()
            .map(|a| format!(" [{}] ", a.index + 1))
            .collect();
        let events = vec![
            Event::MessageStarted,
            Event::delta(prefix.clone()),
            Event::MessageDelta { text, annotations },
        ];

        let (blocks, _) = run(events, ReducerOptions::default());
        prop_assert_eq!(blocks, vec![format!("{prefix}{expected}")]);
    }

    #[test]
    fn one_entry_per_resolvable_citation(
        annotations in proptest::collection::vec(arb_annotation(), 1..8),
    ) {
        let resolvable = annotations
            .iter()
            .filter(|a| matches!(a.file_citation.as_deref(), Some("f0" | "f1" | "f2")))
            .count();
        let events = vec![Event::MessageStarted, Event::completed(annotations)];

        let (blocks, _) = run(events, ReducerOptions::default());
        prop_assert_eq!(blocks.len(), 1);
        prop_assert!(blocks[0].starts_with("\n\nFiles: "));
        prop_assert_eq!(blocks[0].matches("; ").count(), resolvable);
    }

    #[test]
    fn blocks_open_on_start_and_on_orphan_text(
        events in proptest::collection::vec(arb_event(), 0..40),
    ) {
        let expected = expected_opens(&events);
        let (_, updates) = run(events, ReducerOptions::default());
        let opened = updates
            .iter()
            .filter(|u| matches!(u, TurnUpdate::BlockOpened { .. }))
            .count();
        prop_assert_eq!(opened, expected);
    }

    #[test]
    fn replaying_updates_rebuilds_blocks(
        events in proptest::collection::vec(arb_event(), 0..40),
        options in arb_options(),
    ) {
        let (blocks, updates) = run(events, options);

        let mut replayed: Vec<String> = Vec::new();
        let mut open: Option<usize> = None;
        for update in updates {
            match update {
                TurnUpdate::BlockOpened { index } => {
                    prop_assert_eq!(index, replayed.len());
                    prop_assert!(open.is_none());
                    replayed.push(String::new());
                    open = Some(index);
                }
                TurnUpdate::Text { index, fragment } => {
                    prop_assert_eq!(Some(index), open);
                    replayed[index].push_str(&fragment);
                }
                TurnUpdate::BlockAppended { index, block } => {
                    prop_assert_eq!(index, replayed.len());
                    replayed.push(block.as_text().unwrap_or_default().to_string());
                }
                TurnUpdate::BlockClosed { index } => {
                    prop_assert_eq!(Some(index), open);
                    open = None;
                }
            }
        }
        prop_assert!(open.is_none());
        prop_assert_eq!(replayed, blocks);
    }
}

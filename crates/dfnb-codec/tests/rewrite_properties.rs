//! Property tests for the reference codec

use dfnb_codec::{parse_references, render_reference, rewrite, strip_references, Substitution};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// Small cell-like programs mixing references, strings and comments
///
/// Names avoid string-prefix letters so a bare name never fuses with a quote.
fn cell_source() -> impl Strategy<Value = String> {
    let piece = prop_oneof![
        "[acd]",
        "[acd]\\$[0-9a-f]{8}",
        "[acd]\\$tag[0-9]",
        Just(" = ".to_string()),
        Just(" + ".to_string()),
        Just("\n".to_string()),
        Just("9".to_string()),
        Just("'a$x b'".to_string()),
        Just("# c$y\n".to_string()),
        Just("\"\"\"a\nb\"\"\"".to_string()),
    ];
    prop::collection::vec(piece, 0..24).prop_map(|pieces| pieces.join(""))
}

fn reference_choice() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        "[0-9a-f]{8}".prop_map(Some),
        "[A-Za-z_][A-Za-z0-9_]{0,6}".prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn prop_noop_substitutions_preserve_source(source in cell_source()) {
        let subs: Vec<_> = parse_references(&source).iter().map(Substitution::unchanged).collect();
        prop_assert_eq!(rewrite(&source, &subs).unwrap(), source);
    }

    #[test]
    fn prop_rewrite_sets_requested_references(
        source in cell_source(),
        choices in prop::collection::vec(reference_choice(), 24),
    ) {
        let occurrences = parse_references(&source);
        let subs: Vec<_> = occurrences
            .iter()
            .zip(choices.iter())
            .map(|(o, r)| Substitution::new(o.position(), o.name.clone(), r.as_deref()))
            .collect();

        let rewritten = rewrite(&source, &subs).unwrap();
        let reparsed = parse_references(&rewritten);
        prop_assert_eq!(reparsed.len(), occurrences.len());

        for (index, after) in reparsed.iter().enumerate() {
            prop_assert_eq!(&after.name, &occurrences[index].name);
            let expected = match subs.get(index) {
                Some(sub) => sub.reference.as_deref(),
                None => occurrences[index].reference_text(),
            };
            prop_assert_eq!(after.reference_text(), expected);
        }

        // Text outside tokens is untouched
        prop_assert_eq!(strip_references(&rewritten), strip_references(&source));
    }
}

#[test]
fn rendered_tokens_reparse() {
    let text = format!("{} + {}", render_reference("a", Some("testTag")), render_reference("b", None));
    let occurrences = parse_references(&text);
    assert_eq!(occurrences[0].reference_text(), Some("testTag"));
    assert_eq!(occurrences[1].reference_text(), None);
}

//! Parser for payload templates.

use chumsky::prelude::*;

use super::Accessor;
use super::Expr;
use super::Filter;
use super::Primary;
use super::Segment;

/// Build the parser for a complete template.
///
/// A template is literal text interleaved with `{{ expr }}` placeholders.
pub(crate) fn template_parser<'a>()
-> impl Parser<'a, &'a str, Vec<Segment>, extra::Err<Rich<'a, char>>> {
    // String literal, single or double quoted (no escapes)
    let single_quoted = none_of("'")
        .repeated()
        .to_slice()
        .delimited_by(just('\''), just('\''));
    let double_quoted = none_of("\"")
        .repeated()
        .to_slice()
        .delimited_by(just('"'), just('"'));
    let string = single_quoted
        .or(double_quoted)
        .map(|s: &str| s.to_string())
        .labelled("string");

    let index = text::int(10)
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<usize>()
                .map_err(|e| Rich::custom(span, format!("invalid index: {}", e)))
        })
        .labelled("index");

    // Member access: .key, ['key'] or [0]
    let accessor = choice((
        just('.')
            .ignore_then(text::ident())
            .map(|s: &str| Accessor::Key(s.to_string())),
        string
            .clone()
            .padded()
            .delimited_by(just('['), just(']'))
            .map(Accessor::Key),
        index
            .padded()
            .delimited_by(just('['), just(']'))
            .map(Accessor::Index),
    ));

    let variable = text::ident()
        .then(accessor.repeated().collect::<Vec<_>>())
        .try_map(|(name, path): (&str, Vec<Accessor>), span| match name {
            "value" if path.is_empty() => Ok(Primary::Value),
            "value" => Err(Rich::custom(
                span,
                "'value' is the raw payload and has no members, use 'value_json'",
            )),
            "value_json" => Ok(Primary::ValueJson(path)),
            other => Err(Rich::custom(span, format!("unknown variable '{}'", other))),
        })
        .labelled("variable");

    let primary = choice((string.clone().map(Primary::Literal), variable));

    let args = string
        .padded()
        .separated_by(just(','))
        .collect::<Vec<_>>()
        .delimited_by(just('('), just(')'));

    let filter = text::ident()
        .then(args.or_not())
        .try_map(|(name, args): (&str, Option<Vec<String>>), span| {
            Filter::from_call(name, args.unwrap_or_default()).map_err(|msg| Rich::custom(span, msg))
        })
        .labelled("filter");

    let expr = primary
        .padded()
        .then(
            just('|')
                .ignore_then(filter.padded())
                .repeated()
                .collect::<Vec<_>>(),
        )
        .map(|(base, filters)| Expr { base, filters });

    let placeholder = expr
        .delimited_by(just("{{"), just("}}"))
        .map(Segment::Expr);

    let literal_text = any()
        .and_is(just("{{").not())
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| Segment::Text(s.to_string()));

    choice((placeholder, literal_text))
        .repeated()
        .collect()
        .then_ignore(end())
}

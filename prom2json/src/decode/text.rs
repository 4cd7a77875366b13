//! Decoder for the Prometheus [text format].
//!
//! Samples that belong to an already seen family are merged into it, so families are published
//! once the whole input has been read, in order of first appearance.
//!
//! [text format]: https://github.com/prometheus/docs/blob/main/content/docs/instrumenting/exposition_formats.md#text-format-details
use std::collections::HashMap;
use std::io::{self, BufRead};

use indexmap::IndexMap;

use super::{DecodeError, Sink};
use crate::proto::{
    Bucket, Counter, Gauge, Histogram, LabelPair, Metric, MetricFamily, MetricType, Quantile,
    Summary, Untyped,
};

const QUANTILE_LABEL: &str = "quantile";
const BUCKET_LABEL: &str = "le";
const METRIC_NAME_LABEL: &str = "__name__";

/// Decodes text format from `reader` and publishes the families into `sink`.
///
/// ## Errors
///
/// Returns [`DecodeError::Text`] with the offending line number for malformed input, and
/// [`DecodeError::Io`] if reading fails. A line that is not valid UTF-8 is reported as a
/// [`DecodeError::Text`]. Nothing is published when the input is malformed.
pub fn decode<R, S>(mut reader: R, sink: &mut S) -> Result<(), DecodeError>
where
    R: BufRead,
    S: Sink + ?Sized,
{
    let mut parser = Parser::default();
    let mut buffer = String::new();
    let mut line = 0;
    loop {
        buffer.clear();
        let read = match reader.read_line(&mut buffer) {
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                let reason = "invalid UTF-8".to_owned();
                return Err(DecodeError::Text { line: line + 1, reason });
            }
            Err(e) => return Err(e.into()),
        };
        if read == 0 {
            break;
        }
        line += 1;

        let content = buffer.strip_suffix('\n').unwrap_or(&buffer);
        let content = content.strip_suffix('\r').unwrap_or(content);
        parser.parse_line(content).map_err(|reason| DecodeError::Text { line, reason })?;
    }

    for family in parser.finish() {
        sink.publish(family)?;
    }
    Ok(())
}

/// How a sample line contributes to its family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Value,
    Quantile,
    Bucket,
    Sum,
    Count,
}

#[derive(Default)]
struct Parser {
    families: IndexMap<String, FamilyBuilder>,
}

struct FamilyBuilder {
    help: Option<String>,
    kind: Option<MetricType>,
    metrics: Vec<Metric>,
    // Summary and histogram metrics are keyed by their sorted labels.
    groups: HashMap<Vec<(String, String)>, usize>,
}

impl FamilyBuilder {
    fn new() -> Self {
        Self { help: None, kind: None, metrics: Vec::new(), groups: HashMap::new() }
    }

    fn group(&mut self, labels: Vec<LabelPair>) -> &mut Metric {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|pair| {
                (pair.name.clone().unwrap_or_default(), pair.value.clone().unwrap_or_default())
            })
            .collect();
        key.sort();

        let metrics = &mut self.metrics;
        let idx = *self.groups.entry(key).or_insert_with(|| {
            metrics.push(Metric { label: labels, ..Default::default() });
            metrics.len() - 1
        });
        &mut self.metrics[idx]
    }

    fn build(self, name: String) -> MetricFamily {
        MetricFamily {
            name: Some(name),
            help: self.help,
            r#type: self.kind.map(|kind| kind as i32),
            metric: self.metrics,
            unit: None,
        }
    }
}

impl Parser {
    fn parse_line(&mut self, line: &str) -> Result<(), String> {
        let line = line.trim_start_matches(is_blank);
        if line.is_empty() {
            return Ok(());
        }
        match line.strip_prefix('#') {
            Some(comment) => self.parse_comment(comment),
            None => self.parse_sample(line),
        }
    }

    fn parse_comment(&mut self, comment: &str) -> Result<(), String> {
        let mut cursor = Cursor::new(comment);
        cursor.skip_blank();
        let keyword = cursor.take_token();
        if keyword != "HELP" && keyword != "TYPE" {
            return Ok(());
        }

        cursor.skip_blank();
        let name = cursor.take_token();
        if !is_metric_name(name) {
            return Err(format!("invalid metric name in comment: {name:?}"));
        }
        cursor.skip_blank();

        let family = self.families.entry(name.to_owned()).or_insert_with(FamilyBuilder::new);
        if keyword == "HELP" {
            if family.help.is_some() {
                return Err(format!("second HELP line for metric name {name:?}"));
            }
            family.help = Some(unescape(cursor.rest(), false)?);
        } else {
            if family.kind.is_some() {
                return Err(format!(
                    "second TYPE line for metric name {name:?}, or TYPE reported after samples"
                ));
            }
            let keyword = cursor.take_token();
            let kind = MetricType::from_keyword(keyword)
                .ok_or_else(|| format!("unknown metric type {keyword:?}"))?;
            cursor.skip_blank();
            if !cursor.is_empty() {
                return Err(format!("spurious string after metric type: {:?}", cursor.rest()));
            }
            family.kind = Some(kind);
        }
        Ok(())
    }

    fn parse_sample(&mut self, line: &str) -> Result<(), String> {
        let mut cursor = Cursor::new(line);
        let name = cursor.take_while(|idx, c| is_name_char(c, idx == 0, true));
        let terminated =
            cursor.is_empty() || cursor.rest().starts_with(|c: char| is_blank(c) || c == '{');
        if name.is_empty() || !terminated {
            return Err(format!("invalid metric name in sample: {line:?}"));
        }

        cursor.skip_blank();
        let labels = if cursor.eat('{') { parse_labels(&mut cursor)? } else { Vec::new() };

        cursor.skip_blank();
        let token = cursor.take_token();
        if token.is_empty() {
            return Err(format!("expected value after metric {name:?}"));
        }
        let value = parse_float(token).ok_or_else(|| format!("invalid sample value {token:?}"))?;

        cursor.skip_blank();
        let timestamp_ms = if cursor.is_empty() {
            None
        } else {
            let token = cursor.take_token();
            let timestamp =
                token.parse::<i64>().map_err(|_| format!("invalid timestamp {token:?}"))?;
            Some(timestamp)
        };

        cursor.skip_blank();
        if !cursor.is_empty() {
            return Err(format!("spurious string after timestamp: {:?}", cursor.rest()));
        }

        self.record(name, labels, value, timestamp_ms)
    }

    /// Finds the family a sample name belongs to.
    fn locate<'a>(&self, name: &'a str) -> (&'a str, Role) {
        if let Some(family) = self.families.get(name) {
            let role = match family.kind {
                Some(MetricType::Summary) => Role::Quantile,
                Some(kind) if kind.is_histogram() => Role::Bucket,
                _ => Role::Value,
            };
            return (name, role);
        }

        for (suffix, role) in [("_sum", Role::Sum), ("_count", Role::Count), ("_bucket", Role::Bucket)]
        {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            let Some(kind) = self.families.get(base).and_then(|family| family.kind) else {
                continue;
            };
            if kind.is_histogram() || (kind == MetricType::Summary && role != Role::Bucket) {
                return (base, role);
            }
        }

        (name, Role::Value)
    }

    fn record(
        &mut self,
        name: &str,
        mut labels: Vec<LabelPair>,
        value: f64,
        timestamp_ms: Option<i64>,
    ) -> Result<(), String> {
        let (family_name, role) = self.locate(name);
        let family =
            self.families.entry(family_name.to_owned()).or_insert_with(FamilyBuilder::new);
        let kind = *family.kind.get_or_insert(MetricType::Untyped);

        match kind {
            MetricType::Summary => {
                let quantile = match role {
                    Role::Quantile => {
                        let raw = take_label(&mut labels, QUANTILE_LABEL)
                            .ok_or_else(|| format!("summary sample {name:?} has no quantile label"))?;
                        let quantile = parse_float(&raw)
                            .ok_or_else(|| format!("invalid quantile value {raw:?}"))?;
                        Some(quantile)
                    }
                    _ => None,
                };

                let metric = family.group(labels);
                if timestamp_ms.is_some() {
                    metric.timestamp_ms = timestamp_ms;
                }
                let summary = metric.summary.get_or_insert_with(Summary::default);
                match role {
                    Role::Sum => summary.sample_sum = Some(value),
                    Role::Count => summary.sample_count = Some(value as u64),
                    _ => summary.quantile.push(Quantile { quantile, value: Some(value) }),
                }
            }
            kind if kind.is_histogram() => {
                let upper_bound = match role {
                    Role::Bucket => {
                        let raw = take_label(&mut labels, BUCKET_LABEL)
                            .ok_or_else(|| format!("histogram sample {name:?} has no le label"))?;
                        let upper_bound = parse_float(&raw)
                            .ok_or_else(|| format!("invalid upper bound {raw:?}"))?;
                        Some(upper_bound)
                    }
                    _ => None,
                };

                let metric = family.group(labels);
                if timestamp_ms.is_some() {
                    metric.timestamp_ms = timestamp_ms;
                }
                let histogram = metric.histogram.get_or_insert_with(Histogram::default);
                match role {
                    Role::Sum => histogram.sample_sum = Some(value),
                    Role::Count => histogram.sample_count = Some(value as u64),
                    _ => histogram.bucket.push(Bucket {
                        cumulative_count: Some(value as u64),
                        upper_bound,
                        ..Default::default()
                    }),
                }
            }
            _ => {
                let mut metric = Metric { label: labels, timestamp_ms, ..Default::default() };
                match kind {
                    MetricType::Counter => metric.counter = Some(Counter { value: Some(value) }),
                    MetricType::Gauge => metric.gauge = Some(Gauge { value: Some(value) }),
                    _ => metric.untyped = Some(Untyped { value: Some(value) }),
                }
                family.metrics.push(metric);
            }
        }
        Ok(())
    }

    fn finish(self) -> impl Iterator<Item = MetricFamily> {
        self.families
            .into_iter()
            .filter(|(_, family)| !family.metrics.is_empty())
            .map(|(name, family)| family.build(name))
    }
}

fn parse_labels(cursor: &mut Cursor<'_>) -> Result<Vec<LabelPair>, String> {
    let mut labels: Vec<LabelPair> = Vec::new();
    loop {
        cursor.skip_blank();
        if cursor.eat('}') {
            return Ok(labels);
        }

        let name = cursor.take_while(|idx, c| is_name_char(c, idx == 0, false));
        if name.is_empty() {
            return Err(format!("invalid label name at {:?}", cursor.rest()));
        }
        if name == METRIC_NAME_LABEL {
            return Err(format!("label name {METRIC_NAME_LABEL:?} is reserved"));
        }
        if labels.iter().any(|pair| pair.name.as_deref() == Some(name)) {
            return Err(format!("duplicate label name {name:?}"));
        }

        cursor.skip_blank();
        if !cursor.eat('=') {
            return Err(format!("expected '=' after label name {name:?}"));
        }
        cursor.skip_blank();
        if !cursor.eat('"') {
            return Err(format!("expected '\"' to start value of label {name:?}"));
        }
        let value = cursor.take_quoted()?;
        labels.push(LabelPair { name: Some(name.to_owned()), value: Some(value) });

        cursor.skip_blank();
        if cursor.eat(',') {
            continue;
        }
        if cursor.eat('}') {
            return Ok(labels);
        }
        return Err(format!("unexpected end of label value set at {:?}", cursor.rest()));
    }
}

fn take_label(labels: &mut Vec<LabelPair>, name: &str) -> Option<String> {
    let idx = labels.iter().position(|pair| pair.name.as_deref() == Some(name))?;
    labels.remove(idx).value
}

fn parse_float(token: &str) -> Option<f64> {
    token.parse::<f64>().ok()
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn is_name_char(c: char, first: bool, allow_colon: bool) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (allow_colon && c == ':') || (!first && c.is_ascii_digit())
}

fn is_metric_name(name: &str) -> bool {
    !name.is_empty() && name.chars().enumerate().all(|(idx, c)| is_name_char(c, idx == 0, true))
}

/// Resolves `\\` and `\n`, plus `\"` inside label values.
fn unescape(raw: &str, quotes: bool) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('"') if quotes => out.push('"'),
            Some(other) => return Err(format!("invalid escape sequence '\\{other}'")),
            None => return Err("unterminated escape sequence".to_owned()),
        }
    }
    Ok(out)
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn rest(&self) -> &'a str {
        self.rest
    }

    fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    fn skip_blank(&mut self) {
        self.rest = self.rest.trim_start_matches(is_blank);
    }

    fn eat(&mut self, expected: char) -> bool {
        match self.rest.strip_prefix(expected) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn take_while(&mut self, mut accept: impl FnMut(usize, char) -> bool) -> &'a str {
        let end = self
            .rest
            .char_indices()
            .find(|&(idx, c)| !accept(idx, c))
            .map_or(self.rest.len(), |(idx, _)| idx);
        let (taken, rest) = self.rest.split_at(end);
        self.rest = rest;
        taken
    }

    fn take_token(&mut self) -> &'a str {
        self.take_while(|_, c| !is_blank(c))
    }

    /// Consumes a label value up to and including its closing quote.
    fn take_quoted(&mut self) -> Result<String, String> {
        let mut escaped = false;
        let end = self.rest.char_indices().find_map(|(idx, c)| {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                return Some(idx);
            }
            None
        });
        let end = end.ok_or_else(|| "unterminated label value".to_owned())?;
        let raw = &self.rest[..end];
        self.rest = &self.rest[end + 1..];
        unescape(raw, true)
    }
}

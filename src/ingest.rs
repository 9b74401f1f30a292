//! Catalog ingestion
//!
//! The published catalog is a single xz-compressed JSON array of
//! `[tag, payload]` tuples. A `"Filmliste"` tuple appears at most twice:
//! the first carries list metadata, the second the column header. Every
//! `"X"` tuple is a positional data row aligned to that header. The file
//! can be tens of megabytes with hundreds of thousands of rows, so parsing
//! streams tuples through a [`serde::de::DeserializeSeed`] and hands each
//! accepted [`ShowRecord`] to a sink without materializing the decoded
//! document.
//!
//! The source format omits repeated channel/topic/region values to save
//! space; ingestion carries the last non-empty value forward across rows.

use crate::error::{Error, Result};
use crate::types::ShowRecord;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::{self, DeserializeSeed, Visitor};
use std::fmt;
use std::io::{BufReader, Read};
use xz2::read::XzDecoder;

/// Translation of the catalog's source column labels to canonical field
/// names. Labels without a translation keep their source name and are
/// ignored by row decoding.
const FIELDS: &[(&str, &str)] = &[
    ("Beschreibung", "description"),
    ("Datum", "date"),
    ("DatumL", "start"),
    ("Dauer", "duration"),
    ("Geo", "region"),
    ("Größe [MB]", "size"),
    ("Sender", "channel"),
    ("Thema", "topic"),
    ("Titel", "title"),
    ("Url", "url"),
    ("Url HD", "url_hd"),
    ("Url History", "url_history"),
    ("Url Klein", "url_small"),
    ("Url RTMP", "url_rtmp"),
    ("Url RTMP HD", "url_rtmp_hd"),
    ("Url RTMP Klein", "url_rtmp_small"),
    ("Url Untertitel", "url_subtitles"),
    ("Website", "website"),
    ("Zeit", "time"),
    ("neu", "new"),
];

/// Metadata from the catalog's leading `"Filmliste"` tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMetadata {
    /// Publication timestamp (the payload's second, UTC, date variant)
    pub published_at: DateTime<Utc>,
    /// Version of the upstream crawler
    pub crawler_version: String,
    /// Agent string of the upstream crawler
    pub crawler_agent: String,
    /// Identifier of this published list
    pub list_id: String,
}

/// Parse an xz-compressed catalog stream, feeding each accepted record to
/// `sink`. `now` is the run's reference time; every record's `age` is fixed
/// against it during ingestion.
///
/// The sink returns whether ingestion should continue; returning `false`
/// stops the parse immediately with an error (a consumer that can no
/// longer take records has failed, and its own error wins).
pub fn parse_compressed<R: Read, F>(reader: R, now: DateTime<Utc>, sink: F) -> Result<CatalogMetadata>
where
    F: FnMut(ShowRecord) -> bool,
{
    parse(XzDecoder::new(reader), now, sink)
}

/// Parse a decompressed catalog stream.
pub fn parse<R: Read, F>(reader: R, now: DateTime<Utc>, mut sink: F) -> Result<CatalogMetadata>
where
    F: FnMut(ShowRecord) -> bool,
{
    let mut state = IngestState::new(now);
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(reader));
    CatalogSeed {
        state: &mut state,
        sink: &mut sink,
    }
    .deserialize(&mut deserializer)
    .map_err(|e| Error::InvalidCatalog(e.to_string()))?;

    tracing::debug!(
        accepted = state.accepted,
        dropped = state.dropped,
        "catalog parsed"
    );
    state
        .metadata
        .ok_or_else(|| Error::InvalidCatalog("catalog carries no list metadata".to_string()))
}

/// Derive a secondary quality URL from the primary URL and a short
/// extension code. A code of the form `offset|suffix` truncates the
/// primary URL at `offset` and appends the suffix; any other non-empty
/// code is appended whole. An empty code means the tier is unavailable.
pub fn qualify_url(basis: &str, extension: &str) -> Option<String> {
    if extension.is_empty() {
        return None;
    }
    match extension.split_once('|') {
        Some((offset, text)) => {
            let offset: usize = offset.parse().ok()?;
            let prefix = basis.get(..offset)?;
            Some(format!("{prefix}{text}"))
        }
        None => Some(format!("{basis}{extension}")),
    }
}

/// Parse an `H:MM:SS` duration string. Anything that does not match, or
/// overflows a time span, yields zero; the catalog leaves the field empty
/// for some rows and its values are not trusted.
pub fn parse_duration(value: &str) -> Duration {
    let mut parts = value.splitn(3, ':');
    let hours = parts.next().and_then(|p| p.parse::<i64>().ok());
    let minutes = parts.next().and_then(|p| p.parse::<i64>().ok());
    let seconds = parts.next().and_then(|p| p.parse::<i64>().ok());
    match (hours, minutes, seconds) {
        (Some(h), Some(m), Some(s)) => h
            .checked_mul(3600)
            .and_then(|total| total.checked_add(m.checked_mul(60)?))
            .and_then(|total| total.checked_add(s))
            .and_then(Duration::try_seconds)
            .unwrap_or_else(Duration::zero),
        _ => Duration::zero(),
    }
}

struct IngestState {
    now: DateTime<Utc>,
    metadata: Option<CatalogMetadata>,
    header: Option<Vec<String>>,
    last_channel: String,
    last_topic: String,
    last_region: String,
    accepted: u64,
    dropped: u64,
    aborted: bool,
}

impl IngestState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            metadata: None,
            header: None,
            last_channel: String::new(),
            last_topic: String::new(),
            last_region: String::new(),
            accepted: 0,
            dropped: 0,
            aborted: false,
        }
    }

    fn accept<F: FnMut(ShowRecord) -> bool>(
        &mut self,
        tag: &str,
        values: Vec<String>,
        sink: &mut F,
    ) -> Result<()> {
        match tag {
            "Filmliste" if self.metadata.is_none() => {
                // values[0] is the local-time variant; [1] is GMT.
                let published = values
                    .get(1)
                    .and_then(|raw| NaiveDateTime::parse_from_str(raw, "%d.%m.%Y, %H:%M").ok())
                    .map(|naive| naive.and_utc())
                    .ok_or_else(|| {
                        Error::InvalidCatalog("unreadable publication date".to_string())
                    })?;
                self.metadata = Some(CatalogMetadata {
                    published_at: published,
                    crawler_version: values.get(2).cloned().unwrap_or_default(),
                    crawler_agent: values.get(3).cloned().unwrap_or_default(),
                    list_id: values.get(4).cloned().unwrap_or_default(),
                });
            }
            "Filmliste" => {
                if self.header.is_none() {
                    self.header = Some(
                        values
                            .into_iter()
                            .map(|label| {
                                FIELDS
                                    .iter()
                                    .find(|(source, _)| *source == label)
                                    .map(|(_, canonical)| canonical.to_string())
                                    .unwrap_or(label)
                            })
                            .collect(),
                    );
                }
            }
            "X" => {
                let header = self.header.as_ref().ok_or_else(|| {
                    Error::InvalidCatalog("data row before column header".to_string())
                })?;
                let mut row = RowView::new(header, &values);

                // Carry-forward: empty channel/topic/region reuse the last
                // non-empty value; non-empty values update it.
                let channel = carry_forward(row.take("channel"), &mut self.last_channel);
                let topic = carry_forward(row.take("topic"), &mut self.last_topic);
                let region = carry_forward(row.take("region"), &mut self.last_region);

                match self.decode_row(&mut row, channel, topic, region) {
                    Some(record) => {
                        self.accepted += 1;
                        if !sink(record) {
                            self.aborted = true;
                        }
                    }
                    None => self.dropped += 1,
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Decode one positional row, or `None` if the row lacks the required
    /// start, URL or size fields or they do not parse.
    fn decode_row(
        &self,
        row: &mut RowView<'_>,
        channel: String,
        topic: String,
        region: String,
    ) -> Option<ShowRecord> {
        let start_raw = row.take("start");
        let url = row.take("url");
        let size_raw = row.take("size");
        if start_raw.is_empty() || url.is_empty() || size_raw.is_empty() {
            return None;
        }
        let start = DateTime::from_timestamp(start_raw.parse().ok()?, 0)?;
        let size: i64 = size_raw.parse().ok()?;

        let title = row.take("title");
        let duration = parse_duration(&row.take("duration"));
        let hash = ShowRecord::fingerprint(&channel, &topic, &title, size, start);

        Some(ShowRecord {
            hash,
            url_hd: qualify_url(&url, &row.take("url_hd")),
            url_small: qualify_url(&url, &row.take("url_small")),
            url_subtitles: Some(row.take("url_subtitles")).filter(|u| !u.is_empty()),
            description: row.take("description"),
            website: row.take("website"),
            new: row.take("new") == "true",
            age: self.now - start,
            channel,
            topic,
            title,
            region,
            size,
            start,
            duration,
            url,
        })
    }
}

fn carry_forward(value: String, last: &mut String) -> String {
    if value.is_empty() {
        last.clone()
    } else {
        *last = value.clone();
        value
    }
}

/// Header-to-column association for one row. The header is mapped once per
/// catalog; rows are decoded positionally against it.
struct RowView<'a> {
    header: &'a [String],
    values: &'a [String],
}

impl<'a> RowView<'a> {
    fn new(header: &'a [String], values: &'a [String]) -> Self {
        Self { header, values }
    }

    /// The row's value for a canonical field name, or empty if the column
    /// is absent or the row is short.
    fn take(&mut self, field: &str) -> String {
        self.header
            .iter()
            .position(|h| h == field)
            .and_then(|i| self.values.get(i))
            .cloned()
            .unwrap_or_default()
    }
}

/// Seed driving the streaming parse of the top-level tuple array.
struct CatalogSeed<'a, F> {
    state: &'a mut IngestState,
    sink: &'a mut F,
}

impl<'de, F: FnMut(ShowRecord) -> bool> DeserializeSeed<'de> for CatalogSeed<'_, F> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> std::result::Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, F: FnMut(ShowRecord) -> bool> Visitor<'de> for CatalogSeed<'_, F> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an array of [tag, payload] tuples")
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<(), A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        while let Some((tag, payload)) = seq.next_element::<(String, Vec<LenientString>)>()? {
            let values = payload.into_iter().map(|v| v.0).collect();
            self.state
                .accept(&tag, values, self.sink)
                .map_err(de::Error::custom)?;
            if self.state.aborted {
                return Err(de::Error::custom("record sink closed"));
            }
        }
        Ok(())
    }
}

/// A payload cell coerced to text. The format publishes everything as
/// strings, but a stray scalar must not abort the whole ingestion; it
/// decodes to an empty value and the row falls to the acceptance rule.
struct LenientString(String);

impl<'de> Deserialize<'de> for LenientString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = LenientString;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a catalog payload cell")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v.to_string()))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v.to_string()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v.to_string()))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(v.to_string()))
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
                Ok(LenientString(String::new()))
            }
        }
        deserializer.deserialize_any(V)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 8, 1, 12, 0, 0).unwrap()
    }

    /// Minimal catalog document in the published shape: metadata tuple,
    /// header tuple, then positional rows.
    fn sample_catalog(rows: &[Vec<&str>]) -> String {
        let header = [
            "Sender",
            "Thema",
            "Titel",
            "Datum",
            "Zeit",
            "Dauer",
            "Größe [MB]",
            "Beschreibung",
            "Url",
            "Website",
            "Url Untertitel",
            "Url RTMP",
            "Url Klein",
            "Url RTMP Klein",
            "Url HD",
            "Url RTMP HD",
            "DatumL",
            "Url History",
            "Geo",
            "neu",
        ];
        let mut doc = vec![serde_json::json!([
            "Filmliste",
            [
                "01.07.2017, 11:30",
                "01.07.2017, 09:30",
                "3",
                "MSearch [Vers.: 3.1.62]",
                "a2b1"
            ]
        ])];
        doc.push(serde_json::json!(["Filmliste", header]));
        for row in rows {
            doc.push(serde_json::json!(["X", row]));
        }
        serde_json::to_string(&doc).unwrap()
    }

    fn row<'a>(
        channel: &'a str,
        topic: &'a str,
        title: &'a str,
        start: &'a str,
        url: &'a str,
        size: &'a str,
    ) -> Vec<&'a str> {
        vec![
            channel, topic, title, "01.07.2017", "20:15:00", "0:45:00", size, "desc", url,
            "http://site", "", "", "3|small.mp4", "", "_hd.mp4", "", start, "", "DE", "false",
        ]
    }

    fn collect(doc: &str) -> (CatalogMetadata, Vec<ShowRecord>) {
        let mut records = Vec::new();
        let meta = parse(doc.as_bytes(), now(), |r| {
            records.push(r);
            true
        })
        .unwrap();
        (meta, records)
    }

    #[test]
    fn reads_list_metadata_from_the_utc_variant() {
        let (meta, _) = collect(&sample_catalog(&[]));
        assert_eq!(
            meta.published_at,
            Utc.with_ymd_and_hms(2017, 7, 1, 9, 30, 0).unwrap()
        );
        assert_eq!(meta.list_id, "a2b1");
        assert_eq!(meta.crawler_version, "3");
    }

    #[test]
    fn decodes_rows_positionally() {
        let (_, records) = collect(&sample_catalog(&[row(
            "ARD",
            "extra 3",
            "Folge 1",
            "1498939200",
            "http://x/y.mp4",
            "350",
        )]));
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.channel, "ARD");
        assert_eq!(record.title, "Folge 1");
        assert_eq!(record.size, 350);
        assert_eq!(record.duration, Duration::minutes(45));
        assert_eq!(record.start.timestamp(), 1_498_939_200);
        assert_eq!(record.age, now() - record.start);
        assert_eq!(record.url_hd.as_deref(), Some("http://x/y.mp4_hd.mp4"));
        assert_eq!(record.url_small.as_deref(), Some("httsmall.mp4"));
        assert!(!record.new);
    }

    #[test]
    fn carries_channel_and_topic_forward_across_rows() {
        let (_, records) = collect(&sample_catalog(&[
            row("ARD", "a", "1", "1498939200", "http://u/1", "1"),
            row("", "a", "2", "1498939201", "http://u/2", "1"),
            row("ZDF", "b", "3", "1498939202", "http://u/3", "1"),
            row("", "b", "4", "1498939203", "http://u/4", "1"),
        ]));
        let channels: Vec<&str> = records.iter().map(|r| r.channel.as_str()).collect();
        assert_eq!(channels, ["ARD", "ARD", "ZDF", "ZDF"]);
    }

    #[test]
    fn drops_rows_without_start_url_or_size() {
        let (_, records) = collect(&sample_catalog(&[
            row("ARD", "a", "no start", "", "http://u/1", "1"),
            row("ARD", "a", "no url", "1498939200", "", "1"),
            row("ARD", "a", "no size", "1498939200", "http://u/3", ""),
            row("ARD", "a", "ok", "1498939200", "http://u/4", "1"),
        ]));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "ok");
    }

    #[test]
    fn drops_rows_with_unparseable_start() {
        let (_, records) = collect(&sample_catalog(&[row(
            "ARD",
            "a",
            "bad",
            "not-a-number",
            "http://u/1",
            "1",
        )]));
        assert!(records.is_empty());
    }

    #[test]
    fn qualify_url_with_offset_code_truncates_and_appends() {
        assert_eq!(
            qualify_url("http://x/y.mp4", "3|z.mp4").as_deref(),
            Some("httz.mp4")
        );
    }

    #[test]
    fn qualify_url_with_plain_code_appends() {
        assert_eq!(
            qualify_url("http://x/y.mp4", "_hd.mp4").as_deref(),
            Some("http://x/y.mp4_hd.mp4")
        );
    }

    #[test]
    fn qualify_url_with_empty_code_is_unavailable() {
        assert_eq!(qualify_url("http://x/y.mp4", ""), None);
    }

    #[test]
    fn qualify_url_with_bad_offset_is_unavailable() {
        assert_eq!(qualify_url("http://x", "999|z"), None);
        assert_eq!(qualify_url("http://x", "abc|z"), None);
    }

    #[test]
    fn duration_parses_h_mm_ss() {
        assert_eq!(parse_duration("1:02:03"), Duration::seconds(3723));
        assert_eq!(parse_duration("0:45:00"), Duration::minutes(45));
    }

    #[test]
    fn duration_is_zero_on_any_non_match() {
        assert_eq!(parse_duration(""), Duration::zero());
        assert_eq!(parse_duration("45:00"), Duration::zero());
        assert_eq!(parse_duration("x:y:z"), Duration::zero());
    }

    #[test]
    fn duration_is_zero_when_components_overflow() {
        assert_eq!(parse_duration("99999999999999999:00:00"), Duration::zero());
        assert_eq!(
            parse_duration("9223372036854775807:00:00"),
            Duration::zero()
        );
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let doc = r#"[["X", ["a"]]]"#;
        assert!(parse(doc.as_bytes(), now(), |_| true).is_err());
    }

    #[test]
    fn sink_refusal_stops_the_parse() {
        let doc = sample_catalog(&[
            row("ARD", "a", "1", "1498939200", "http://u/1", "1"),
            row("ARD", "a", "2", "1498939201", "http://u/2", "1"),
            row("ARD", "a", "3", "1498939202", "http://u/3", "1"),
        ]);
        let mut seen = 0;
        let result = parse(doc.as_bytes(), now(), |_| {
            seen += 1;
            false
        });
        assert!(result.is_err());
        assert_eq!(seen, 1);
    }

    #[test]
    fn compressed_round_trip() {
        use std::io::Write;
        use xz2::write::XzEncoder;

        let doc = sample_catalog(&[row("ARD", "a", "t", "1498939200", "http://u/1", "7")]);
        let mut encoder = XzEncoder::new(Vec::new(), 6);
        encoder.write_all(doc.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut records = Vec::new();
        let meta = parse_compressed(compressed.as_slice(), now(), |r| {
            records.push(r);
            true
        })
        .unwrap();
        assert_eq!(meta.list_id, "a2b1");
        assert_eq!(records.len(), 1);
    }
}

//! Catalog refresh and query flow against a mock mirror.

use chrono::{TimeZone, Utc};
use mediathek_dl::{Catalog, Database, FilterSet, RemoteSource};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xz2::write::XzEncoder;

/// A small catalog document in the published shape, xz-compressed:
/// metadata tuple, header tuple, then positional rows.
fn compressed_catalog(rows: &[Vec<&str>]) -> Vec<u8> {
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

    let mut encoder = XzEncoder::new(Vec::new(), 6);
    encoder
        .write_all(serde_json::to_string(&doc).unwrap().as_bytes())
        .unwrap();
    encoder.finish().unwrap()
}

fn row<'a>(channel: &'a str, topic: &'a str, title: &'a str, start: &'a str) -> Vec<&'a str> {
    vec![
        channel, topic, title, "01.07.2017", "20:15:00", "0:45:00", "350", "desc",
        "http://x/y.mp4", "http://site", "", "", "", "", "", "", start, "", "DE", "false",
    ]
}

async fn catalog_over(server: &MockServer, dir: &tempfile::TempDir) -> Catalog {
    let db = Database::open(&dir.path().join(".mediathek-dl.db"), Duration::from_secs(1))
        .await
        .unwrap();
    let source = RemoteSource::new(
        reqwest::Client::new(),
        vec![format!("{}/Filmliste-akt.xz", server.uri())],
        Duration::from_millis(1),
    );
    Catalog::new(db, source, dir.path().to_path_buf(), 3)
}

#[tokio::test]
async fn first_run_ingests_and_a_fresh_catalog_is_not_refetched() {
    let server = MockServer::start().await;
    let payload = compressed_catalog(&[
        row("ARD", "extra 3", "Folge 1", "1498939200"),
        row("", "extra 3", "Folge 2", "1498942800"),
        row("ZDF", "heute", "Ausgabe", "1498946400"),
    ]);
    Mock::given(method("GET"))
        .and(path("/Filmliste-akt.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_over(&server, &dir).await;

    // Half an hour after publication the catalog counts as current.
    let now = Utc.with_ymd_and_hms(2017, 7, 1, 10, 0, 0).unwrap();
    catalog.ensure_fresh(now).await.unwrap();
    catalog.ensure_fresh(now).await.unwrap();

    let shows = catalog
        .query(&[FilterSet::default()], true, now, None)
        .await
        .unwrap();
    assert_eq!(shows.len(), 3);

    // The empty channel cell reuses the previous row's channel.
    assert_eq!(shows[1].channel, "ARD");
    assert_eq!(shows[1].title, "Folge 2");

    let snapshot = catalog.database().snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.list_id, "a2b1");
    assert_eq!(
        snapshot.published_at,
        Utc.with_ymd_and_hms(2017, 7, 1, 9, 30, 0).unwrap()
    );
}

#[tokio::test]
async fn stale_catalog_is_replaced_wholesale() {
    let server = MockServer::start().await;
    let payload = compressed_catalog(&[row("ARD", "extra 3", "Folge 1", "1498939200")]);
    Mock::given(method("GET"))
        .and(path("/Filmliste-akt.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_over(&server, &dir).await;

    let now = Utc.with_ymd_and_hms(2017, 7, 1, 10, 0, 0).unwrap();
    catalog.ensure_fresh(now).await.unwrap();

    // A day later the snapshot is outside the refresh window.
    let later = Utc.with_ymd_and_hms(2017, 7, 2, 10, 0, 0).unwrap();
    catalog.ensure_fresh(later).await.unwrap();

    assert_eq!(catalog.database().show_count().await.unwrap(), 1);
}

#[tokio::test]
async fn queries_run_against_the_ingested_records() {
    let server = MockServer::start().await;
    let payload = compressed_catalog(&[
        row("ARD", "extra 3", "Folge 1", "1498939200"),
        row("ZDF", "heute", "Ausgabe", "1498942800"),
    ]);
    Mock::given(method("GET"))
        .and(path("/Filmliste-akt.xz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let catalog = catalog_over(&server, &dir).await;
    let now = Utc.with_ymd_and_hms(2017, 7, 1, 10, 0, 0).unwrap();
    catalog.ensure_fresh(now).await.unwrap();

    let ard = FilterSet::compile(&["channel=ARD", "duration+20m"]).unwrap();
    let shows = catalog.query(&[ard], true, now, None).await.unwrap();
    assert_eq!(shows.len(), 1);
    assert_eq!(shows[0].title, "Folge 1");

    // A legal predicate with an unsatisfiable value yields no matches.
    let absurd = FilterSet::compile(&["channel=ARD", "size+9999999999"]).unwrap();
    let shows = catalog.query(&[absurd], true, now, None).await.unwrap();
    assert!(shows.is_empty());
}

//! End-to-end download tests against a mock HTTP server.

use chrono::{Duration, TimeZone, Utc};
use mediathek_dl::{Error, FetchOutcome, MediaFetcher, QualityPreference, ShowRecord};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn show(url: String, subtitles: Option<String>) -> ShowRecord {
    let start = Utc.with_ymd_and_hms(2017, 7, 1, 20, 15, 0).unwrap();
    ShowRecord {
        hash: ShowRecord::fingerprint("ARD", "extra 3", "Folge 1", 350, start),
        channel: "ARD".into(),
        topic: "extra 3".into(),
        title: "Folge 1".into(),
        description: String::new(),
        region: "DE".into(),
        website: String::new(),
        size: 350,
        start,
        duration: Duration::minutes(45),
        age: Duration::hours(3),
        new: false,
        url,
        url_small: None,
        url_hd: None,
        url_subtitles: subtitles,
    }
}

fn fetcher(server_dir: &std::path::Path, subtitles: bool) -> MediaFetcher {
    MediaFetcher::new(
        reqwest::Client::new(),
        server_dir.to_path_buf(),
        "{dir}/{channel}/{title}{ext}".to_string(),
        subtitles,
    )
}

fn assert_no_scratch_left(dir: &std::path::Path) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "scratch left behind: {leftovers:?}");
}

#[tokio::test]
async fn direct_file_lands_on_the_templated_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"movie bytes".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let record = show(format!("{}/media/video.mp4", server.uri()), None);

    let outcome = fetcher(dir.path(), false)
        .fetch(&record, QualityPreference::standard())
        .await
        .unwrap();

    let expected = dir.path().join("ARD/Folge 1.mp4");
    assert_eq!(outcome, FetchOutcome::Saved(expected.clone()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"movie bytes");
    assert_no_scratch_left(dir.path());
}

#[tokio::test]
async fn adaptive_manifest_is_reassembled_into_one_ts_file() {
    let server = MockServer::start().await;
    let master = "\
#EXTM3U
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=100,CODECS=\"avc1.4d401f,mp4a.40.2\"
low/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=200,CODECS=\"avc1.4d401f,mp4a.40.2\"
mid/index.m3u8
#EXT-X-STREAM-INF:PROGRAM-ID=1,BANDWIDTH=300,CODECS=\"avc1.640028,mp4a.40.2\"
high/index.m3u8
";
    let variant = "#EXTM3U\n#EXTINF:10,\nseg0.ts\n#EXTINF:10,\nseg1.ts\n#EXTINF:10,\nseg2.ts\n#EXT-X-ENDLIST\n";
    Mock::given(method("GET"))
        .and(path("/show/master.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(master.as_bytes().to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/show/mid/index.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(variant.as_bytes().to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    for (segment, bytes) in [("seg0.ts", b"AA"), ("seg1.ts", b"BB"), ("seg2.ts", b"CC")] {
        Mock::given(method("GET"))
            .and(path(format!("/show/mid/{segment}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let record = show(format!("{}/show/master.m3u8", server.uri()), None);

    // The default preference picks the median-bandwidth variant.
    let outcome = fetcher(dir.path(), false)
        .fetch(&record, QualityPreference::standard())
        .await
        .unwrap();

    let expected = dir.path().join("ARD/Folge 1.ts");
    assert_eq!(outcome, FetchOutcome::Saved(expected.clone()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"AABBCC");
    assert_no_scratch_left(dir.path());
}

#[tokio::test]
async fn subtitles_are_converted_and_saved_alongside_the_media() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/video.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"movie".to_vec()))
        .mount(&server)
        .await;
    let document = r##"<?xml version="1.0" encoding="utf-8"?>
<tt:tt xmlns:tt="http://www.w3.org/ns/ttml" xmlns:tts="http://www.w3.org/ns/ttml#styling">
  <tt:head><tt:styling>
    <tt:style xml:id="textWhite" tts:color="#FFFFFF"/>
  </tt:styling></tt:head>
  <tt:body><tt:div>
    <tt:p xml:id="sub0" begin="00:00:01.000" end="00:00:03.000">
      <tt:span style="textWhite">Guten Abend.</tt:span>
    </tt:p>
  </tt:div></tt:body>
</tt:tt>"##;
    Mock::given(method("GET"))
        .and(path("/media/video.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(document.as_bytes().to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let record = show(
        format!("{}/media/video.mp4", server.uri()),
        Some(format!("{}/media/video.xml", server.uri())),
    );

    fetcher(dir.path(), true)
        .fetch(&record, QualityPreference::standard())
        .await
        .unwrap();

    let srt = std::fs::read_to_string(dir.path().join("ARD/Folge 1.srt")).unwrap();
    assert_eq!(
        srt,
        "1\n00:00:01,000 --> 00:00:03,000\n<font color=\"#FFFFFF\">Guten Abend.</font>\n\n"
    );
    assert_no_scratch_left(dir.path());
}

#[tokio::test]
async fn unsupported_extension_fails_without_touching_the_destination() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/video.wmv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wmv".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let record = show(format!("{}/media/video.wmv", server.uri()), None);

    let err = fetcher(dir.path(), false)
        .fetch(&record, QualityPreference::standard())
        .await
        .unwrap_err();

    match err {
        Error::UnsupportedFormat { extension } => assert_eq!(extension, ".wmv"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!dir.path().join("ARD").exists());
    assert_no_scratch_left(dir.path());
}

#[tokio::test]
async fn quality_preference_falls_through_to_an_available_tier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/small.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"small".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut record = show(format!("{}/media/video.mp4", server.uri()), None);
    record.url_small = Some(format!("{}/media/small.mp4", server.uri()));

    // HD is absent; with a low preference the small tier wins outright.
    let outcome = fetcher(dir.path(), false)
        .fetch(&record, QualityPreference::low())
        .await
        .unwrap();

    let expected = dir.path().join("ARD/Folge 1.mp4");
    assert_eq!(outcome, FetchOutcome::Saved(expected.clone()));
    assert_eq!(std::fs::read(&expected).unwrap(), b"small");
}

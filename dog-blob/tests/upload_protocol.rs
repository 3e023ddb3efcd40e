use std::sync::Arc;

use bytes::Bytes;
use dog_blob::prelude::*;
use dog_blob::{Published, ResponseBody};
use futures_util::StreamExt;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

struct Harness {
    _dir: TempDir,
    server: BlobServer,
}

fn memory_server() -> Harness {
    harness(|_| memory_store(), BlobConfig::default())
}

fn memory_store() -> Arc<dyn ContentStore> {
    Arc::new(MemoryContentStore::default())
}

fn file_server(config: BlobConfig) -> Harness {
    harness(
        |dir| {
            let store = FileContentStore::new(dir.path().join("cache"), config.refcount).unwrap();
            Arc::new(store) as Arc<dyn ContentStore>
        },
        config.clone(),
    )
}

fn harness(store: impl FnOnce(&TempDir) -> Arc<dyn ContentStore>, config: BlobConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let staging = StagingArea::new(dir.path().join("uploads")).unwrap();
    let store = store(&dir);
    let server = BlobServer::new(store, Arc::new(UploadSessions::new(staging)), config);
    Harness { _dir: dir, server }
}

fn sha(data: &[u8]) -> Digest {
    Digest::of(Algorithm::Sha256, data)
}

fn blob_error(err: &anyhow::Error) -> &BlobError {
    BlobError::from_anyhow(err).expect("error should carry a BlobError")
}

async fn start(server: &BlobServer) -> String {
    let res = server.post_upload(BlobRequest::new()).await.unwrap();
    assert_eq!(res.status, 202);
    res.header("upload-uuid").unwrap().to_string()
}

fn chunk(uuid: &str, range: &str, data: &'static [u8]) -> BlobRequest {
    BlobRequest::new()
        .with_param("uuid", uuid)
        .with_header("Content-Range", range)
        .with_bytes(data)
}

fn commit(uuid: &str, digest: &Digest) -> BlobRequest {
    BlobRequest::new()
        .with_param("uuid", uuid)
        .with_query("digest", digest.to_string())
}

async fn read_all(server: &BlobServer, digest: &Digest) -> Vec<u8> {
    let mut res = server
        .get_blob(BlobRequest::new().with_param("digest", digest.to_string()))
        .await
        .unwrap();
    assert_eq!(res.status, 200);
    let mut stream = res.take_stream().expect("blob body");
    let mut out = Vec::new();
    while let Some(piece) = stream.next().await {
        out.extend_from_slice(&piece.unwrap());
    }
    out
}

static HUNDRED: [u8; 100] = [b'a'; 100];
static TWO_HUNDRED: [u8; 200] = [b'b'; 200];

#[tokio::test]
async fn contiguous_chunks_advance_the_offset() {
    let h = memory_server();
    let uuid = start(&h.server).await;

    let res = assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
    assert_eq!(res.status, 202);
    assert_eq!(res.header("range"), Some("0-99"));

    assert_ok!(h.server.patch_upload(chunk(&uuid, "100-199", &HUNDRED)).await);
    let res = assert_ok!(h.server.patch_upload(chunk(&uuid, "200-299", &HUNDRED)).await);
    assert_eq!(res.header("range"), Some("0-299"));
    assert_eq!(res.header("location"), Some(format!("/blobs/uploads/{uuid}").as_str()));

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 300);
}

#[tokio::test]
async fn gap_is_a_range_conflict_and_keeps_the_offset() {
    let h = memory_server();
    let uuid = start(&h.server).await;

    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "150-199", &HUNDRED[..50])).await);
    assert!(matches!(
        blob_error(&err),
        BlobError::RangeConflict { start: 150, offset: 100 }
    ));

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 100);
}

#[tokio::test]
async fn chunk_without_range_appends_at_offset() {
    let h = memory_server();
    let uuid = start(&h.server).await;

    let req = BlobRequest::new().with_param("uuid", uuid.as_str()).with_bytes(&TWO_HUNDRED[..]);
    let res = assert_ok!(h.server.patch_upload(req).await);
    assert_eq!(res.header("range"), Some("0-199"));
}

#[tokio::test]
async fn body_shorter_than_range_is_rejected_and_rolled_back() {
    let h = memory_server();
    let uuid = start(&h.server).await;

    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED[..40])).await);
    assert!(matches!(blob_error(&err), BlobError::MalformedRange { .. }));

    // The session is still usable from offset 0.
    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
}

#[tokio::test]
async fn chunk_over_the_limit_is_rejected() {
    let h = harness(
        |_| memory_store(),
        BlobConfig::default().with_max_chunk_bytes(64),
    );
    let uuid = start(&h.server).await;

    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
    assert!(matches!(blob_error(&err), BlobError::MalformedRange { .. }));

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 0);
}

#[tokio::test]
async fn malformed_inputs_are_reported() {
    let h = memory_server();

    let err = assert_err!(
        h.server
            .get_blob(BlobRequest::new().with_param("digest", "sha256:nothex"))
            .await
    );
    assert!(matches!(blob_error(&err), BlobError::MalformedDigest { .. }));

    let uuid = start(&h.server).await;
    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "9-0", b"x")).await);
    assert!(matches!(blob_error(&err), BlobError::MalformedRange { .. }));

    let err = assert_err!(h.server.patch_upload(chunk("not-a-uuid", "0-0", b"x")).await);
    assert!(matches!(blob_error(&err), BlobError::UnknownSession { .. }));

    // PUT needs a digest.
    let err = assert_err!(
        h.server
            .put_upload(BlobRequest::new().with_param("uuid", uuid.as_str()))
            .await
    );
    assert!(matches!(blob_error(&err), BlobError::MalformedDigest { .. }));
}

#[tokio::test]
async fn commit_publishes_exact_bytes() {
    let h = file_server(BlobConfig::default());
    let uuid = start(&h.server).await;
    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);

    let expected: Vec<u8> = HUNDRED.iter().chain(TWO_HUNDRED.iter()).copied().collect();
    let digest = sha(&expected);

    let req = commit(&uuid, &digest)
        .with_header("content-range", "bytes 100-299/300")
        .with_bytes(&TWO_HUNDRED[..]);
    let res = assert_ok!(h.server.put_upload(req).await);
    assert_eq!(res.status, 201);
    assert_eq!(res.header("location"), Some(format!("/blobs/{digest}").as_str()));

    assert!(h.server.store().exists(&digest).await.unwrap());
    assert!(h.server.uploads().is_empty());
    assert_eq!(read_all(&h.server, &digest).await, expected);
}

#[tokio::test]
async fn digest_mismatch_leaves_store_empty_and_session_resumable() {
    let h = memory_server();
    let uuid = start(&h.server).await;
    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);

    let wrong = sha(b"something else");
    let err = assert_err!(h.server.put_upload(commit(&uuid, &wrong)).await);
    match blob_error(&err) {
        BlobError::DigestMismatch { expected, actual } => {
            assert_eq!(expected, &wrong.to_string());
            assert_eq!(actual, &sha(&HUNDRED).to_string());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!h.server.store().exists(&wrong).await.unwrap());

    let id = UploadId::parse(&uuid).unwrap();
    assert!(h.server.uploads().contains(&id));

    let res = assert_ok!(h.server.put_upload(commit(&uuid, &sha(&HUNDRED))).await);
    assert_eq!(res.status, 201);
}

#[tokio::test]
async fn existing_digest_short_circuits_without_a_session() {
    let store = Arc::new(MemoryContentStore::default());
    let digest = store.insert(Bytes::from_static(b"hello"));
    let h = harness(|_| store.clone() as Arc<dyn ContentStore>, BlobConfig::default());

    let res = assert_ok!(
        h.server
            .post_upload(BlobRequest::new().with_query("digest", digest.to_string()))
            .await
    );
    assert_eq!(res.status, 201);
    assert_eq!(res.header("location"), Some(format!("/blobs/{digest}").as_str()));
    assert_eq!(res.header("upload-uuid"), None);
    assert!(h.server.uploads().is_empty());
}

#[tokio::test]
async fn patch_for_existing_digest_short_circuits() {
    let store = Arc::new(MemoryContentStore::default());
    let digest = store.insert(Bytes::from_static(b"hello"));
    let h = harness(|_| store.clone() as Arc<dyn ContentStore>, BlobConfig::default());
    let uuid = start(&h.server).await;

    let req = chunk(&uuid, "0-4", b"hello").with_query("digest", digest.to_string());
    let res = assert_ok!(h.server.patch_upload(req).await);
    assert_eq!(res.status, 201);

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 0);
}

#[tokio::test]
async fn patch_checks_the_session_before_the_stored_digest() {
    let store = Arc::new(MemoryContentStore::default());
    let digest = store.insert(Bytes::from_static(b"hello"));
    let h = harness(|_| store.clone() as Arc<dyn ContentStore>, BlobConfig::default());

    let req = chunk("00000000-0000-4000-8000-000000000000", "0-4", b"hello")
        .with_query("digest", digest.to_string());
    let err = assert_err!(h.server.patch_upload(req).await);
    assert!(matches!(blob_error(&err), BlobError::UnknownSession { .. }));

    let uuid = start(&h.server).await;
    let req = chunk(&uuid, "garbage", b"hello").with_query("digest", digest.to_string());
    let err = assert_err!(h.server.patch_upload(req).await);
    assert!(matches!(blob_error(&err), BlobError::MalformedRange { .. }));
}

#[tokio::test]
async fn dropped_chunk_leaves_the_session_resumable() {
    let h = file_server(BlobConfig::default());
    let uuid = start(&h.server).await;

    let stalled: ByteStream = Box::pin(
        futures_util::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(&[b'x'; 60])) })
            .chain(futures_util::stream::pending()),
    );
    let req = BlobRequest::new()
        .with_param("uuid", uuid.as_str())
        .with_body(stalled);
    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(100),
        h.server.patch_upload(req),
    )
    .await;
    assert!(timed_out.is_err());

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 0);

    let data: &'static [u8] = b"0123456789";
    let res = assert_ok!(h.server.patch_upload(chunk(&uuid, "0-9", data)).await);
    assert_eq!(res.header("range"), Some("0-9"));

    let digest = sha(data);
    let res = assert_ok!(h.server.put_upload(commit(&uuid, &digest)).await);
    assert_eq!(res.status, 201);
    assert_eq!(read_all(&h.server, &digest).await, data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_appends_at_the_same_offset_have_one_winner() {
    let h = memory_server();
    let uuid = start(&h.server).await;

    let a = h.server.clone();
    let b = h.server.clone();
    let (ua, ub) = (uuid.clone(), uuid.clone());
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.patch_upload(chunk(&ua, "0-99", &HUNDRED)).await }),
        tokio::spawn(async move { b.patch_upload(chunk(&ub, "0-99", &HUNDRED)).await }),
    );
    let results = [ra.unwrap(), rb.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        blob_error(loser),
        BlobError::RangeConflict { start: 0, offset: 100 }
    ));

    let id = UploadId::parse(&uuid).unwrap();
    assert_eq!(h.server.uploads().offset(&id).await.unwrap(), 100);
}

#[tokio::test]
async fn ten_byte_upload_end_to_end() {
    let h = file_server(BlobConfig::default());
    let data: &'static [u8] = b"0123456789";
    let digest = sha(data);

    let res = assert_ok!(
        h.server
            .post_upload(BlobRequest::new().with_query("digest", digest.to_string()))
            .await
    );
    assert_eq!(res.status, 202);
    let uuid = res.header("upload-uuid").unwrap().to_string();

    let res = assert_ok!(h.server.patch_upload(chunk(&uuid, "0-9", data)).await);
    assert_eq!(res.header("range"), Some("0-9"));

    let res = assert_ok!(h.server.put_upload(commit(&uuid, &digest)).await);
    assert_eq!(res.status, 201);

    assert_eq!(read_all(&h.server, &digest).await, data);
}

#[tokio::test]
async fn same_content_committed_twice_is_stored_once() {
    let h = file_server(BlobConfig::default());
    let digest = sha(&HUNDRED);

    let first = start(&h.server).await;
    let second = start(&h.server).await;
    assert_ok!(h.server.patch_upload(chunk(&first, "0-99", &HUNDRED)).await);
    assert_ok!(h.server.patch_upload(chunk(&second, "0-99", &HUNDRED)).await);

    let (a, b) = tokio::join!(
        h.server.put_upload(commit(&first, &digest)),
        h.server.put_upload(commit(&second, &digest)),
    );
    assert_eq!(assert_ok!(a).status, 201);
    assert_eq!(assert_ok!(b).status, 201);
    assert!(h.server.uploads().is_empty());
    assert_eq!(read_all(&h.server, &digest).await, HUNDRED.to_vec());
}

#[tokio::test]
async fn store_reports_already_present_on_second_publish() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContentStore::new(dir.path().join("cache"), false).unwrap();
    let uploads = UploadSessions::new(StagingArea::new(dir.path().join("uploads")).unwrap());
    let digest = sha(b"abc");

    let mut outcomes = Vec::new();
    for _ in 0..2 {
        let id = uploads.create().await.unwrap();
        let handle = uploads.get(&id).unwrap();
        let mut session = uploads.lock(&handle).await.unwrap();
        let body: ByteStream = Box::pin(futures_util::stream::once(async {
            Ok(Bytes::from_static(b"abc"))
        }));
        session.append_chunk(None, body, 1024).await.unwrap();
        outcomes.push(uploads.commit(&mut session, &digest, &store).await.unwrap());
    }
    assert_eq!(outcomes, vec![Published::Written, Published::AlreadyPresent]);
}

#[tokio::test]
async fn published_blob_is_synced_into_its_shard() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileContentStore::new(dir.path().join("cache"), false).unwrap();
    let uploads = UploadSessions::new(StagingArea::new(dir.path().join("uploads")).unwrap());
    let digest = sha(&HUNDRED);

    let id = uploads.create().await.unwrap();
    let handle = uploads.get(&id).unwrap();
    let mut session = uploads.lock(&handle).await.unwrap();
    let body: ByteStream = Box::pin(futures_util::stream::once(async {
        Ok(Bytes::from_static(&HUNDRED))
    }));
    session.append_chunk(None, body, 1024).await.unwrap();
    assert_ok!(session.staging().sync().await);
    let staged_path = session.staging().path().to_path_buf();

    assert_eq!(
        uploads.commit(&mut session, &digest, &store).await.unwrap(),
        Published::Written
    );
    assert!(!staged_path.exists());
    let stored = std::fs::read(store.root().join(digest.shard_path())).unwrap();
    assert_eq!(stored, HUNDRED.to_vec());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let h = file_server(BlobConfig::default());
    let absent = sha(b"never stored");
    let before = h.server.store().exists(&absent).await.unwrap();

    let res = assert_ok!(
        h.server
            .delete_blob(BlobRequest::new().with_param("digest", absent.to_string()))
            .await
    );
    assert_eq!(res.status, 202);
    assert_eq!(h.server.store().exists(&absent).await.unwrap(), before);
}

#[tokio::test]
async fn get_after_delete_is_not_found() {
    let h = file_server(BlobConfig::default());
    let uuid = start(&h.server).await;
    let digest = sha(b"bye");
    assert_ok!(h.server.put_upload(commit(&uuid, &digest).with_bytes(&b"bye"[..])).await);

    let req = || BlobRequest::new().with_param("digest", digest.to_string());
    assert_ok!(h.server.delete_blob(req()).await);
    let err = assert_err!(h.server.get_blob(req()).await);
    assert!(matches!(blob_error(&err), BlobError::NotFound { .. }));
}

#[tokio::test]
async fn referenced_blob_cannot_be_deleted() {
    let h = file_server(BlobConfig::default().with_refcount(true));
    let uuid = start(&h.server).await;
    let digest = sha(b"kept");
    assert_ok!(h.server.put_upload(commit(&uuid, &digest).with_bytes(&b"kept"[..])).await);

    assert_eq!(h.server.store().retain(&digest).await.unwrap(), 1);
    let req = || BlobRequest::new().with_param("digest", digest.to_string());
    let err = assert_err!(h.server.delete_blob(req()).await);
    assert!(matches!(blob_error(&err), BlobError::Referenced { refs: 1, .. }));

    assert_eq!(h.server.store().release(&digest).await.unwrap(), 0);
    assert_ok!(h.server.delete_blob(req()).await);
    assert!(!h.server.store().exists(&digest).await.unwrap());
}

#[tokio::test]
async fn status_and_abort() {
    let h = memory_server();
    let uuid = start(&h.server).await;
    let req = || BlobRequest::new().with_param("uuid", uuid.as_str());

    let res = assert_ok!(h.server.upload_status(req()).await);
    assert_eq!(res.status, 204);
    assert_eq!(res.header("range"), None);

    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
    let res = assert_ok!(h.server.upload_status(req()).await);
    assert_eq!(res.header("range"), Some("0-99"));
    assert_eq!(res.header("upload-uuid"), Some(uuid.as_str()));

    let res = assert_ok!(h.server.abort_upload(req()).await);
    assert_eq!(res.status, 204);
    assert!(h.server.uploads().is_empty());

    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "100-199", &HUNDRED)).await);
    assert!(matches!(blob_error(&err), BlobError::UnknownSession { .. }));
}

#[tokio::test]
async fn downloads_are_octet_streams_with_length() {
    let store = Arc::new(MemoryContentStore::default());
    let digest = store.insert(Bytes::from_static(b"payload"));
    let h = harness(|_| store.clone() as Arc<dyn ContentStore>, BlobConfig::default());

    let res = assert_ok!(
        h.server
            .get_blob(BlobRequest::new().with_param("digest", digest.to_string()))
            .await
    );
    assert_eq!(res.header("content-type"), Some("application/octet-stream"));
    assert_eq!(res.header("content-length"), Some("7"));
    assert!(matches!(res.body, ResponseBody::Stream { length: 7, .. }));
}

#[tokio::test]
async fn errors_map_to_client_visible_statuses() {
    let h = memory_server();
    let uuid = start(&h.server).await;
    assert_ok!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);

    let err = assert_err!(h.server.patch_upload(chunk(&uuid, "0-99", &HUNDRED)).await);
    let dog = blob_error(&err).to_dog_error();
    assert_eq!(dog.code(), 416);

    let err = assert_err!(
        h.server
            .get_blob(BlobRequest::new().with_param("digest", sha(b"x").to_string()))
            .await
    );
    assert_eq!(blob_error(&err).to_dog_error().code(), 404);
}

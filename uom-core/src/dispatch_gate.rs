//! Pre-queue dispatch gate: the single entry point every request
//! passes through before a `Job` is ever created. It detects what kind of
//! thing it was handed and decides whether the full six-stage pipeline even
//! applies, or whether the request should short-circuit straight to a
//! specialized downstream service.

use std::io::{Cursor, Read};
use std::sync::Arc;

use uom_contracts::decision_engine::{DecisionContext, RequestFingerprint};
use uom_contracts::pattern_cache::{PatternCache, PatternExecutor, DEFAULT_MIN_SUCCESS_RATE};
use uom_model::decision::DecisionPoint;
use uom_model::file_context::{FileContext, FileLocator, OrgSecurityPolicy, UserContext};
use uom_model::ids::CorrelationId;

/// Outcome of classifying a URL-referenced request, before any job exists.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum UrlClassification {
    YouTube,
    GitHubRepository,
    GoogleDrive,
    HttpDirectVideo,
    HttpDirectOther,
    LocalFile,
    Unknown,
}

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "m4v"];

/// Classifies a referenced URL into the buckets the dispatch gate needs to
/// decide whether to short-circuit.
pub fn classify_url(raw: &str) -> UrlClassification {
    let Ok(parsed) = url::Url::parse(raw) else {
        return UrlClassification::LocalFile;
    };
    let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();

    if host == "youtube.com" || host == "www.youtube.com" || host == "youtu.be" || host == "m.youtube.com" {
        return UrlClassification::YouTube;
    }
    if host == "github.com" || host == "www.github.com" {
        let segments: Vec<&str> = parsed.path_segments().map(|s| s.collect()).unwrap_or_default();
        if segments.len() >= 2 && !segments.iter().any(|s| s.is_empty()) {
            return UrlClassification::GitHubRepository;
        }
        return UrlClassification::Unknown;
    }
    if host == "drive.google.com" || host == "docs.google.com" {
        return UrlClassification::GoogleDrive;
    }
    if parsed.scheme() == "http" || parsed.scheme() == "https" {
        let ext = parsed
            .path_segments()
            .and_then(|mut s| s.next_back())
            .and_then(|last| last.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()));
        return match ext {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => UrlClassification::HttpDirectVideo,
            _ => UrlClassification::HttpDirectOther,
        };
    }
    UrlClassification::Unknown
}

/// A signature-based magic byte table, consulted before falling back to the
/// client-declared content type. Short enough to stay exhaustive rather than
/// reaching for a crate to cover a handful of formats the pipeline actually
/// routes on.
const MAGIC_SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A], "image/png"),
    (&[0xFF, 0xD8, 0xFF], "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (&[b'P', b'K', 0x03, 0x04], "application/zip"),
    (&[0x1F, 0x8B], "application/gzip"),
    (&[0x7F, b'E', b'L', b'F'], "application/x-executable"),
    (b"MZ", "application/x-msdownload"),
    (&[0x25, 0x21, b'P', b'S'], "application/postscript"),
];

/// Detects the authoritative MIME type from the file's leading bytes,
/// falling back to the client-declared type, then `application/octet-stream`
/// (client-declared type is advisory only).
pub fn sniff_mime_type(bytes: &[u8], client_declared: Option<&str>) -> String {
    for (signature, mime) in MAGIC_SIGNATURES {
        if bytes.starts_with(signature) {
            return (*mime).to_string();
        }
    }
    client_declared
        .map(str::to_string)
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Archive formats the gate fans out into child jobs rather than submitting
/// as a single opaque file. Only `application/zip` is actually unpacked --
/// the others are flagged here for classification but still fall through to
/// ordinary single-job enqueue, since unpacking them needs more than the
/// `zip` crate already in the dependency tree.
pub fn is_fan_out_archive(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "application/zip" | "application/x-tar" | "application/gzip" | "application/x-7z-compressed"
    )
}

/// Extensions and MIME types the gate routes straight to CyberAgent without
/// ever creating a Job -- known executable/binary formats the LLM-driven
/// triage step would otherwise have to spend a round trip classifying.
const SUSPICIOUS_EXTENSIONS: &[&str] = &["exe", "dll", "so", "dylib", "bin", "msi", "elf", "scr", "com"];
const SUSPICIOUS_MIMES: &[&str] = &[
    "application/x-msdownload",
    "application/x-executable",
    "application/x-sharedlib",
    "application/x-mach-binary",
];

fn is_suspicious(mime_type: &str, filename: &str) -> bool {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    SUSPICIOUS_MIMES.contains(&mime_type) || SUSPICIOUS_EXTENSIONS.contains(&ext.as_str())
}

/// Unpacks a ZIP archive into one `FileContext` per non-directory entry.
/// Returns `None` on a malformed archive or an archive with no usable
/// entries -- the caller enqueues the original file as a single opaque job
/// instead of failing the request outright.
fn fan_out_zip(bytes: &[u8]) -> Option<Vec<FileContext>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
    let mut files = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).ok()?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut content = Vec::with_capacity(entry.size() as usize);
        if entry.read_to_end(&mut content).is_err() {
            continue;
        }
        let mime_type = sniff_mime_type(&content, None);
        let size = content.len() as u64;
        if let Ok(file) = FileContext::new(name, mime_type, size, FileLocator::Inline(content)) {
            files.push(file);
        }
    }
    if files.is_empty() {
        None
    } else {
        Some(files)
    }
}

/// What the dispatch gate decided to do with one incoming request.
pub enum DispatchOutcome {
    /// Enqueue as an ordinary job; the six-stage pipeline runs normally.
    Enqueue(FileContext),
    /// One file unpacked into several child file contexts, each enqueued
    /// independently; the caller aggregates their results.
    FanOut(Vec<FileContext>),
    /// Routed directly to a specialized service without ever creating a Job.
    ShortCircuit { target: &'static str, reason: String },
}

/// Services the gate needs for its unknown-MIME cache-hit short circuit.
/// Either field left `None` simply disables that check -- the gate still
/// works fine with no pattern cache configured at all.
#[derive(Clone, Default)]
pub struct GateServices {
    pub pattern_cache: Option<Arc<dyn PatternCache>>,
    pub pattern_executor: Option<Arc<dyn PatternExecutor>>,
}

/// Looks up a cached pattern for a file whose MIME type sniffing couldn't
/// identify. Success short-circuits the request entirely; failure records
/// the miss and lets the caller fall through to ordinary enqueue so the full
/// pipeline (and eventually a fresh pattern) handles it.
async fn try_cached_pattern(file: &FileContext, services: &GateServices) -> Option<DispatchOutcome> {
    let cache = services.pattern_cache.as_ref()?;
    let executor = services.pattern_executor.as_ref()?;

    let user = UserContext::anonymous();
    let org = OrgSecurityPolicy::default();
    let ctx = DecisionContext {
        correlation_id: CorrelationId::new(),
        file,
        user: &user,
        org_policies: &org,
        sandbox_result: None,
        security_decision: None,
        route_decision: None,
        processing_result: None,
    };
    let fingerprint = RequestFingerprint::compute(&ctx, DecisionPoint::ProcessingRoute);
    let found = cache.find_pattern(&fingerprint, DEFAULT_MIN_SUCCESS_RATE).await.ok().flatten()?;

    let started = std::time::Instant::now();
    let outcome = executor.execute(&found.pattern, file).await.ok()?;
    let elapsed = started.elapsed().as_millis() as u64;

    if outcome.success {
        let _ = cache.record_success(&fingerprint, elapsed).await;
        Some(DispatchOutcome::ShortCircuit {
            target: "cached_pattern_executor",
            reason: format!(
                "unknown MIME type matched a cached pattern ({:.0}% success rate)",
                found.confidence * 100.0
            ),
        })
    } else {
        let _ = cache.record_failure(&fingerprint, elapsed).await;
        None
    }
}

/// Builds a `FileContext` for an uploaded file, detecting its MIME type from
/// the raw bytes rather than trusting the client.
pub async fn dispatch_upload(
    filename: &str,
    bytes: &[u8],
    client_declared_mime_type: Option<&str>,
    services: &GateServices,
) -> DispatchOutcome {
    let mime_type = sniff_mime_type(bytes, client_declared_mime_type);

    if is_fan_out_archive(&mime_type) {
        if let Some(files) = fan_out_zip(bytes) {
            return DispatchOutcome::FanOut(files);
        }
    }

    if is_suspicious(&mime_type, filename) {
        return DispatchOutcome::ShortCircuit {
            target: "cyberagent",
            reason: format!("{mime_type} is a known binary format, routed directly to CyberAgent"),
        };
    }

    match FileContext::new(filename, mime_type.clone(), bytes.len() as u64, FileLocator::Inline(bytes.to_vec())) {
        Ok(mut file) => {
            file.client_declared_mime_type = client_declared_mime_type.map(str::to_string);
            if mime_type == "application/octet-stream" {
                if let Some(outcome) = try_cached_pattern(&file, services).await {
                    return outcome;
                }
            }
            DispatchOutcome::Enqueue(file)
        }
        Err(error) => DispatchOutcome::ShortCircuit {
            target: "rejected",
            reason: error.to_string(),
        },
    }
}

/// Decides what to do with a referenced URL before a job exists.
pub fn dispatch_url(raw_url: &str) -> DispatchOutcome {
    match classify_url(raw_url) {
        UrlClassification::YouTube => DispatchOutcome::ShortCircuit {
            target: "videoagent",
            reason: "YouTube URL routed directly to VideoAgent".into(),
        },
        UrlClassification::GitHubRepository => DispatchOutcome::ShortCircuit {
            target: "github_manager",
            reason: "GitHub repository URL routed directly to GitHubManager".into(),
        },
        UrlClassification::GoogleDrive => DispatchOutcome::ShortCircuit {
            target: "mageagent",
            reason: "Google Drive links require authenticated download before classification".into(),
        },
        UrlClassification::HttpDirectVideo | UrlClassification::HttpDirectOther | UrlClassification::LocalFile => {
            let mime_type = if matches!(classify_url(raw_url), UrlClassification::HttpDirectVideo) {
                "video/mp4"
            } else {
                "application/octet-stream"
            };
            match FileContext::new(
                raw_url.rsplit('/').next().unwrap_or("referenced_file"),
                mime_type,
                0,
                FileLocator::OriginalUrl(raw_url.to_string()),
            ) {
                Ok(file) => DispatchOutcome::Enqueue(file),
                Err(error) => DispatchOutcome::ShortCircuit {
                    target: "rejected",
                    reason: error.to_string(),
                },
            }
        }
        UrlClassification::Unknown => DispatchOutcome::ShortCircuit {
            target: "rejected",
            reason: "URL did not match any known classification".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn youtube_urls_are_classified_regardless_of_subdomain() {
        assert_eq!(classify_url("https://www.youtube.com/watch?v=abc"), UrlClassification::YouTube);
        assert_eq!(classify_url("https://youtu.be/abc"), UrlClassification::YouTube);
    }

    #[test]
    fn github_repo_requires_owner_and_name_segments() {
        assert_eq!(
            classify_url("https://github.com/rust-lang/rust"),
            UrlClassification::GitHubRepository
        );
        assert_eq!(classify_url("https://github.com/rust-lang"), UrlClassification::Unknown);
    }

    #[test]
    fn direct_http_video_extension_is_detected() {
        assert_eq!(
            classify_url("https://cdn.example.com/clip.mp4"),
            UrlClassification::HttpDirectVideo
        );
        assert_eq!(
            classify_url("https://cdn.example.com/doc.pdf"),
            UrlClassification::HttpDirectOther
        );
    }

    #[test]
    fn pdf_magic_bytes_are_detected_over_a_wrong_client_declared_type() {
        let bytes = b"%PDF-1.7 rest of file";
        assert_eq!(sniff_mime_type(bytes, Some("text/plain")), "application/pdf");
    }

    #[test]
    fn unknown_bytes_fall_back_to_client_declared_type() {
        let bytes = b"not a known signature";
        assert_eq!(sniff_mime_type(bytes, Some("text/csv")), "text/csv");
    }

    #[test]
    fn unknown_bytes_with_no_declared_type_fall_back_to_octet_stream() {
        let bytes = b"not a known signature";
        assert_eq!(sniff_mime_type(bytes, None), "application/octet-stream");
    }

    #[test]
    fn zip_archives_are_flagged_for_fan_out() {
        assert!(is_fan_out_archive("application/zip"));
        assert!(!is_fan_out_archive("application/pdf"));
    }

    #[test]
    fn youtube_url_short_circuits_to_videoagent() {
        match dispatch_url("https://youtu.be/abc") {
            DispatchOutcome::ShortCircuit { target, .. } => assert_eq!(target, "videoagent"),
            _ => panic!("expected a short circuit"),
        }
    }

    #[test]
    fn suspicious_binary_extension_is_flagged_even_with_generic_mime() {
        assert!(is_suspicious("application/octet-stream", "installer.exe"));
        assert!(!is_suspicious("application/pdf", "report.pdf"));
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(Cursor::new(&mut buffer));
            let options: zip::write::FileOptions<()> =
                zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
            for (name, content) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer
    }

    #[test]
    fn zip_archive_with_three_entries_fans_out_into_three_files() {
        let bytes = build_zip(&[
            ("a.pdf", b"%PDF-1.7 a"),
            ("b.pdf", b"%PDF-1.7 b"),
            ("c.pdf", b"%PDF-1.7 c"),
        ]);
        let files = fan_out_zip(&bytes).expect("archive should unpack");
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.mime_type == "application/pdf"));
    }

    #[tokio::test]
    async fn dispatch_upload_fans_out_zip_archives() {
        let bytes = build_zip(&[("a.pdf", b"%PDF-1.7 a"), ("b.pdf", b"%PDF-1.7 b")]);
        let services = GateServices::default();
        match dispatch_upload("bundle.zip", &bytes, Some("application/zip"), &services).await {
            DispatchOutcome::FanOut(files) => assert_eq!(files.len(), 2),
            _ => panic!("expected a fan-out"),
        }
    }

    #[tokio::test]
    async fn dispatch_upload_routes_known_binaries_to_cyberagent() {
        let services = GateServices::default();
        match dispatch_upload("installer.exe", b"MZ rest of header", None, &services).await {
            DispatchOutcome::ShortCircuit { target, .. } => assert_eq!(target, "cyberagent"),
            _ => panic!("expected a short circuit"),
        }
    }

    #[tokio::test]
    async fn dispatch_upload_with_no_pattern_cache_enqueues_unknown_mime() {
        let services = GateServices::default();
        match dispatch_upload("mystery.bin", b"not a known signature", None, &services).await {
            DispatchOutcome::Enqueue(file) => assert_eq!(file.mime_type, "application/octet-stream"),
            _ => panic!("expected ordinary enqueue with no pattern cache configured"),
        }
    }
}

//! PDF rendering through the production worker: layout, conversion and the
//! on-disk result.

use cv_export::cv::{CvTemplate, EducationEntry, ExperienceEntry, ExportCvData, PersonalInfo};
use cv_export::renderer::layout::render_svg;
use cv_export::renderer::{CvRenderer, PdfExportWorker, RenderErrorKind, SvgToPdfConverter};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn full_cv(template: CvTemplate) -> ExportCvData {
    ExportCvData {
        template,
        personal: PersonalInfo {
            full_name: "Grace Brewster Hopper".into(),
            email: "grace@example.com".into(),
            headline: Some("Computer scientist".into()),
            location: Some("Arlington, VA".into()),
            ..Default::default()
        },
        summary: Some("Pioneer of machine-independent programming languages. ".repeat(10)),
        experience: (0..12)
            .map(|i| ExperienceEntry {
                title: format!("Role {i}"),
                company: "US Navy".into(),
                start_date: Some(format!("{}", 1944 + i)),
                end_date: None,
                description: Some("Led the team that wrote the first compiler. ".repeat(6)),
            })
            .collect(),
        education: vec![EducationEntry {
            institution: "Yale University".into(),
            degree: Some("PhD Mathematics".into()),
            start_date: Some("1930".into()),
            end_date: Some("1934".into()),
        }],
        skills: vec!["COBOL".into(), "FLOW-MATIC".into()],
        languages: vec!["English".into()],
    }
}

fn worker(dir: &TempDir, timeout: Duration) -> PdfExportWorker {
    PdfExportWorker::new(
        Arc::new(SvgToPdfConverter::new()),
        dir.path(),
        "https://cv.example.com/",
        timeout,
    )
}

#[tokio::test]
async fn test_both_templates_render_valid_pdfs() {
    let dir = TempDir::new().unwrap();
    let worker = worker(&dir, Duration::from_secs(30));

    for template in [CvTemplate::Classic, CvTemplate::Compact] {
        let url = worker.render(&full_cv(template)).await.unwrap();
        let name = url
            .strip_prefix("https://cv.example.com/files/")
            .expect("URL under the public files path");

        let pdf = std::fs::read(dir.path().join(name)).unwrap();
        assert!(pdf.starts_with(b"%PDF"), "{template:?} output is not a PDF");
        assert!(pdf.len() > 1000);
    }
}

#[tokio::test]
async fn test_long_cv_grows_the_page() {
    let svg = render_svg(&full_cv(CvTemplate::Classic));
    let tree = usvg::Tree::from_str(&svg, &usvg::Options::default()).unwrap();
    assert!(tree.size().height() > 842.0);
    assert_eq!(tree.size().width(), 595.0);
}

#[tokio::test]
async fn test_invalid_cv_fails_as_input_without_output() {
    let dir = TempDir::new().unwrap();
    let worker = worker(&dir, Duration::from_secs(30));

    let mut cv = full_cv(CvTemplate::Classic);
    cv.personal.email = "not-an-address".into();

    let err = worker.render(&cv).await.unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::Input);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_render_over_budget_times_out() {
    let dir = TempDir::new().unwrap();
    let worker = worker(&dir, Duration::ZERO);

    let err = worker.render(&full_cv(CvTemplate::Classic)).await.unwrap_err();
    assert_eq!(err.kind, RenderErrorKind::Timeout);

    // the conversion outlives the render; let it finish before the dir goes
    worker.wait_idle().await;
}

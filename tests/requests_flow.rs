mod common;

use anyhow::Result;
use axum::http::{header, StatusCode};
use exam_requests::auth::Role;
use exam_requests::db::encode_bytea;
use exam_requests::requests::Category;
use serde_json::{json, Value};

use common::{body_json, body_to_vec, TestApp};

const PERIODIC: &str = "requests_periodic";
const EVALUATION: &str = "requests_medical_evaluation";

fn seed(app: &TestApp) -> Result<()> {
    let store = app.store();
    store.create_table(
        PERIODIC,
        &["protocolo", "cpf", "user", "status_final", "criado_em", "funcionario"],
    )?;
    store.insert_row(
        PERIODIC,
        json!({
            "protocolo": "P-100",
            "cpf": "11122233344",
            "user": "ana",
            "status_final": "Em Aberto",
            "criado_em": "2024-03-01T10:00:00Z",
            "funcionario": "Joana Silva"
        }),
    )?;
    store.insert_row(
        PERIODIC,
        json!({
            "protocolo": "P-200",
            "cpf": "99988877766",
            "user": "bia",
            "status_final": "Em Andamento",
            "criado_em": "2024-04-01T10:00:00Z",
            "funcionario": "Bruno Lima"
        }),
    )?;

    store.create_table(
        EVALUATION,
        &["protocolo", "cpf", "status_final", "nome_arquivo", "arquivo"],
    )?;
    store.insert_row(
        EVALUATION,
        json!({
            "protocolo": "A-1",
            "cpf": "11122233344",
            "status_final": "Finalizado",
            "nome_arquivo": "justificativa.pdf",
            "arquivo": encode_bytea(b"%PDF-1.7 blob")
        }),
    )?;
    Ok(())
}

fn protocols(body: &Value) -> Vec<String> {
    body["requests"]
        .as_array()
        .map(|requests| {
            requests
                .iter()
                .filter_map(|r| r["protocol"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn listing_requires_a_token() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/api/requests", None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = body_json(response.into_body()).await?;
    assert_eq!(body, json!({ "ok": false, "error": "unauthorized" }));
    Ok(())
}

#[tokio::test]
async fn administrators_cannot_list_requests() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let token = app.token("root", Role::Administrator, None)?;
    let response = app.get("/api/requests", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn clients_only_see_their_own_requests() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let token = app.token("ana", Role::Client, Some("11122233344"))?;

    let response = app.get("/api/requests", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response.into_body()).await?;

    let mut seen = protocols(&body);
    seen.sort();
    assert_eq!(seen, vec!["A-1", "P-100"]);
    assert_eq!(
        body["statuses"],
        json!(["Em Aberto", "Em Andamento", "Finalizado", "Não Aprovado"])
    );

    let evaluation = body["requests"]
        .as_array()
        .and_then(|requests| requests.iter().find(|r| r["protocol"] == "A-1"))
        .cloned()
        .unwrap_or_default();
    assert_eq!(evaluation["exam_type"], Category::MedicalEvaluation.label());
    assert_eq!(evaluation["status_slug"], "finalizado");
    assert_eq!(
        evaluation["documents"][0]["stored_name"],
        Category::MedicalEvaluation.blob_sentinel().unwrap_or_default()
    );
    Ok(())
}

#[tokio::test]
async fn consultants_see_every_request_with_facets() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let token = app.consultant_token()?;

    let response = app.get("/api/requests", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response.into_body()).await?;

    let mut seen = protocols(&body);
    seen.sort();
    assert_eq!(seen, vec!["A-1", "P-100", "P-200"]);
    assert_eq!(body["protocols"], json!(["A-1", "P-100", "P-200"]));
    assert_eq!(body["exam_types"], json!(["Avaliação Médica", "Periódico"]));
    Ok(())
}

#[tokio::test]
async fn documents_are_listed_and_downloaded_from_the_category_root() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let root = app
        .roots()
        .root_for(Category::Periodic)
        .map(|root| root.to_path_buf())
        .unwrap_or_default();
    app.put_file(&root, "P-100", "aso.pdf", b"%PDF-1.4 aso")?;
    app.put_file(&root, "P-100", "notes.exe", b"MZ")?;
    let token = app.token("ana", Role::Client, Some("11122233344"))?;

    let response = app
        .get("/api/requests/P-100/documents", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response.into_body()).await?;
    assert_eq!(body["protocol"], "P-100");
    assert_eq!(
        body["documents"],
        json!([{ "filename": "aso.pdf", "stored_name": "aso.pdf" }])
    );

    let response = app
        .get("/api/documents/P-100/aso.pdf", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"aso.pdf\"; filename*=UTF-8''aso%2Epdf"
    );
    let bytes = body_to_vec(response.into_body()).await?;
    assert_eq!(bytes, b"%PDF-1.4 aso");
    Ok(())
}

#[tokio::test]
async fn other_clients_cannot_read_a_protocol() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let root = app
        .roots()
        .root_for(Category::Periodic)
        .map(|root| root.to_path_buf())
        .unwrap_or_default();
    app.put_file(&root, "P-100", "aso.pdf", b"%PDF-1.4 aso")?;
    let token = app.token("bia", Role::Client, Some("99988877766"))?;

    let response = app
        .get("/api/requests/P-100/documents", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .get("/api/documents/P-100/aso.pdf", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = body_json(response.into_body()).await?;
    assert_eq!(body["error"], "forbidden");
    Ok(())
}

#[tokio::test]
async fn unsafe_and_unknown_names_are_rejected() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let token = app.consultant_token()?;

    let response = app
        .get("/api/documents/P-100/..", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response.into_body()).await?;
    assert_eq!(body["error"], "invalid_filename");

    let response = app
        .get("/api/documents/P-100/missing.pdf", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .get("/api/documents/P-100/payload.sh", Some(&token))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn row_attachments_are_served_to_their_owner() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;

    let owner = app.token("ana", Role::Client, Some("11122233344"))?;
    let response = app
        .get("/api/attachments/medical-evaluation/A-1", Some(&owner))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    let bytes = body_to_vec(response.into_body()).await?;
    assert_eq!(bytes, b"%PDF-1.7 blob");

    let stranger = app.token("bia", Role::Client, Some("99988877766"))?;
    let response = app
        .get("/api/attachments/medical-evaluation/A-1", Some(&stranger))
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let consultant = app.consultant_token()?;
    let response = app
        .get("/api/attachments/periodic/P-100", Some(&consultant))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn health_reports_request_tables() -> Result<()> {
    let app = TestApp::new()?;
    seed(&app)?;
    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = body_json(response.into_body()).await?;
    assert_eq!(body, json!({ "status": "ok", "request_tables": 2 }));
    Ok(())
}

//! End-to-end test of the `capa_pje` job against a stub SSO and case API.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;

use docket_core::{
    register_builtin_jobs,
    testing::{
        fixtures::{self_signed_keystore, workbook_bytes},
        MockDriverFactory, MockObjectStorage, MockPageDriver, MockProgressChannel,
    },
    BrowserCookie, CapturedRequest, ChallengeResponseConfig, CredentialStore, DispatchRequest,
    FieldValue, JobController, JobRegistry, JobServices, JobSettings, RuntimeConfig,
    XlsxSheetStore, ERROR_REASON_FIELD, ERROR_SHEET,
};

const BUCKET: &str = "docket";
const OTP_URI: &str =
    "otpauth://totp/Docket:office?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=Docket";

const KNOWN_15: &str = "0010045-12.2023.5.15.0001";
const UNKNOWN_15: &str = "0010046-12.2023.5.15.0001";
const KNOWN_2: &str = "0020001-01.2022.5.02.0010";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-xsrf-token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("tok"))
}

async fn basic_data(headers: HeaderMap, Path((_base, number)): Path<(String, String)>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match number.as_str() {
        KNOWN_15 => Json(json!([{"id": 991}])).into_response(),
        KNOWN_2 => Json(json!({"id": "992"})).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn details(headers: HeaderMap, Path((_base, id)): Path<(String, i64)>) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let number = if id == 991 { KNOWN_15 } else { KNOWN_2 };
    Json(json!({
        "id": id,
        "numero": number,
        "classeJudicial": {"descricao": "Ação Trabalhista - Rito Ordinário", "sigla": "ATOrd"},
        "orgaoJulgador": {"descricao": "1ª Vara do Trabalho", "sigla": "VT1"},
        "distribuidoEm": "2023-02-01T10:00:00",
        "labelStatusProcesso": "Distribuído",
        "segredoDeJustica": false,
        "valorDaCausa": 25000.0
    }))
    .into_response()
}

async fn parties(Path((_base, _id)): Path<(String, i64)>) -> Json<serde_json::Value> {
    Json(json!({
        "ATIVO": [{
            "id": 10,
            "nome": "Maria Souza",
            "polo": "ATIVO",
            "tipoPessoa": "F",
            "principal": true,
            "representantes": [{"id": 11, "nome": "Dr. Lima", "polo": "ATIVO", "tipoPessoa": "F"}]
        }],
        "PASSIVO": [{"id": 12, "nome": "Empresa SA", "polo": "PASSIVO", "tipoPessoa": "J"}]
    }))
}

async fn subjects(Path((_base, _id)): Path<(String, i64)>) -> Json<serde_json::Value> {
    Json(json!([{"id": 5, "assunto": {"assuntoCompleto": "Horas Extras", "assuntoResumido": "HE"}}]))
}

async fn stub_court() -> String {
    let app = Router::new()
        .route("/sso/challenge", post(|| async { StatusCode::NO_CONTENT }))
        .route("/{base}/api/processos/dadosbasicos/{number}", get(basic_data))
        .route("/{base}/api/processos/id/{id}", get(details))
        .route("/{base}/api/processos/id/{id}/partes", get(parties))
        .route("/{base}/api/processos/id/{id}/assuntos", get(subjects))
        .route(
            "/{base}/api/processos/id/{id}/audiencias",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{}", addr)
}

fn certificate(server: &str) -> ChallengeResponseConfig {
    toml::from_str(&format!(
        r#"
challenge_endpoint = "{server}/sso/challenge"
sso_login_url = "https://court{{region}}.example.test/login"
sso_host = "https://sso.example.test/"
api_base_url = "{server}/trt{{region}}/"
keystore_object = "certs/office.pfx"
keystore_passphrase = "pfx-pass"
otp_uri = "{otp}"
form_timeout_ms = 200
otp_timeout_ms = 200
post_login_timeout_ms = 200
poll_interval_ms = 10
"#,
        server = server,
        otp = OTP_URI
    ))
    .unwrap()
}

async fn sso_driver(server: &str) -> MockPageDriver {
    let driver = MockPageDriver::new();
    driver
        .redirect_on_navigate("example.test/login", "https://sso.example.test/auth?client=pje")
        .await;
    driver.add_element("form#kc-form-login").await;
    driver.add_element(r#"input[id="otp"]"#).await;
    driver
        .redirect_on_enter(r#"input[id="otp"]"#, "https://court.example.test/pjekz/painel")
        .await;

    let captured = ["15", "2"]
        .iter()
        .map(|region| CapturedRequest {
            url: format!("{}/trt{}/api/processos/painel", server, region),
            headers: HashMap::from([("X-XSRF-TOKEN".to_string(), format!("tok{}", region))]),
        })
        .collect();
    driver.set_captured_requests(captured).await;
    driver
        .set_cookies(vec![BrowserCookie {
            name: "JSESSIONID".to_string(),
            value: "s1".to_string(),
            domain: None,
        }])
        .await;
    driver
}

fn workbook(dir: &std::path::Path, label: &str) -> XlsxSheetStore {
    let path = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(label))
        })
        .unwrap();
    XlsxSheetStore::new(path)
}

#[tokio::test]
async fn test_case_cover_extracts_each_region() {
    let server = stub_court().await;
    let work_dir = TempDir::new().unwrap();

    let storage = MockObjectStorage::new();
    storage
        .insert(BUCKET, "certs/office.pfx", self_signed_keystore("pfx-pass"))
        .await;
    let rows: Vec<Vec<FieldValue>> = [KNOWN_15, KNOWN_2, UNKNOWN_15]
        .iter()
        .map(|n| vec![FieldValue::from(*n)])
        .collect();
    storage
        .insert(BUCKET, "in/input.xlsx", workbook_bytes(&["NUMERO_PROCESSO"], &rows))
        .await;

    let drivers = MockDriverFactory::new(sso_driver(&server).await);
    let channel = MockProgressChannel::new();
    let services = JobServices {
        storage: Arc::new(storage.clone()),
        channel: Some(Arc::new(channel.clone())),
        drivers: Arc::new(drivers.clone()),
        credentials: CredentialStore::default(),
        settings: JobSettings {
            runtime: RuntimeConfig {
                work_dir: work_dir.path().to_path_buf(),
                pool_size: 1,
                flush_grace_ms: 0,
                ..Default::default()
            },
            bucket: BUCKET.to_string(),
            certificate: Some(certificate(&server)),
            password_login: HashMap::new(),
        },
    };
    let mut registry = JobRegistry::new();
    register_builtin_jobs(&mut registry);
    let controller = JobController::new(Arc::new(registry), Arc::new(services));

    let summary = controller
        .dispatch(DispatchRequest {
            category: "capa".to_string(),
            system: "pje".to_string(),
            pid: "7".to_string(),
            input_file: Some("input.xlsx".to_string()),
            storage_prefix: Some("in".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.job, "capa_pje");
    assert_eq!(summary.counters.success, 2);
    assert_eq!(summary.counters.error, 1);

    let output = work_dir.path().join("output/7");
    let success = workbook(&output, "Sucessos");
    let covers = success.read_sheet("Capa").unwrap().unwrap();
    let links: Vec<String> = covers
        .iter()
        .map(|r| r.get_text("LINK_CONSULTA").unwrap())
        .collect();
    assert_eq!(
        links,
        vec![
            "https://pje.trt15.jus.br/pjekz/processo/991/detalhe".to_string(),
            "https://pje.trt2.jus.br/pjekz/processo/992/detalhe".to_string(),
        ]
    );
    assert_eq!(success.read_sheet("Partes").unwrap().unwrap().len(), 4);
    assert_eq!(success.read_sheet("Representantes").unwrap().unwrap().len(), 2);
    assert_eq!(success.read_sheet("Assuntos").unwrap().unwrap().len(), 2);
    assert!(success.read_sheet("Audiências").unwrap().is_none());

    let errors = workbook(&output, "Erros").read_sheet(ERROR_SHEET).unwrap().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].get_text("NUMERO_PROCESSO").unwrap(), UNKNOWN_15);
    assert!(errors[0]
        .get_text(ERROR_REASON_FIELD)
        .unwrap()
        .contains(UNKNOWN_15));

    assert!(!work_dir.path().join("keystores/7.pfx").exists());
    assert_eq!(drivers.launch_count(), 1);
    assert_eq!(drivers.driver().quit_count().await, 1);
    assert_eq!(drivers.driver().navigations().await.len(), 2);

    let events = channel.published().await;
    assert!(events
        .iter()
        .any(|e| e.message.ends_with(&format!("> Searching case {}]", KNOWN_2))));
}

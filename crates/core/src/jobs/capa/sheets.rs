use super::api::{CaseDetails, Hearing, PartiesBySide, Representative, Subject};
use crate::record::{FieldValue, WorkRecord};

pub const COVER_SHEET: &str = "Capa";
pub const HEARINGS_SHEET: &str = "Audiências";
pub const SUBJECTS_SHEET: &str = "Assuntos";
pub const PARTIES_SHEET: &str = "Partes";
pub const REPRESENTATIVES_SHEET: &str = "Representantes";

/// Public page of a case in the regional court.
pub fn case_link(region: &str, case_id: i64) -> String {
    format!(
        "https://pje.trt{}.jus.br/pjekz/processo/{}/detalhe",
        region, case_id
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Sim"
    } else {
        "Não"
    }
}

fn text(value: &Option<String>) -> FieldValue {
    FieldValue::from(value.clone().unwrap_or_default())
}

/// One row with the case's cover data.
pub fn cover_row(region: &str, case: &CaseDetails) -> WorkRecord {
    let mut row = WorkRecord::new();
    row.insert("ID_PJE", case.id);
    row.insert("LINK_CONSULTA", case_link(region, case.id));
    row.insert("PROCESSO", case.numero.as_str());
    row.insert("CLASSE", text(&case.classe_judicial.descricao));
    row.insert("SIGLA_CLASSE", text(&case.classe_judicial.sigla));
    row.insert("ORGAO_JULGADOR", text(&case.orgao_julgador.descricao));
    row.insert("SIGLA_ORGAO_JULGADOR", text(&case.orgao_julgador.sigla));
    row.insert("DATA_DISTRIBUICAO", text(&case.distribuido_em));
    row.insert("STATUS_PROCESSO", text(&case.label_status_processo));
    row.insert(
        "SEGREDO_JUSTICA",
        yes_no(case.segredo_de_justica.unwrap_or(false)),
    );
    if let Some(value) = case.valor_da_causa {
        row.insert("VALOR_CAUSA", value);
    }
    row
}

pub fn hearing_rows(number: &str, hearings: &[Hearing]) -> Vec<WorkRecord> {
    hearings
        .iter()
        .map(|h| {
            let mut row = WorkRecord::new();
            row.insert("ID_PJE", h.id);
            row.insert("PROCESSO", number);
            row.insert("TIPO_AUDIENCIA", text(&h.tipo.descricao));
            row.insert(
                "MODO_AUDIENCIA",
                if h.tipo.is_virtual { "VIRTUAL" } else { "PRESENCIAL" },
            );
            row.insert("STATUS", text(&h.status));
            row.insert("DATA_INICIO", text(&h.data_inicio));
            row.insert("DATA_FIM", text(&h.data_fim));
            row.insert("DATA_MARCACAO", text(&h.data_marcacao));
            row
        })
        .collect()
}

pub fn subject_rows(number: &str, subjects: &[Subject]) -> Vec<WorkRecord> {
    subjects
        .iter()
        .map(|s| {
            let mut row = WorkRecord::new();
            row.insert("ID_PJE", s.id);
            row.insert("PROCESSO", number);
            row.insert("ASSUNTO_COMPLETO", text(&s.assunto.assunto_completo));
            row.insert("ASSUNTO_RESUMIDO", text(&s.assunto.assunto_resumido));
            row
        })
        .collect()
}

fn person_kind(code: Option<&str>) -> &'static str {
    match code.map(|c| c.trim().to_lowercase()) {
        Some(c) if c == "j" => "Jurídica",
        _ => "Física",
    }
}

fn phone(rep: &Representative) -> String {
    match (&rep.ddd_celular, &rep.numero_celular) {
        (Some(ddd), Some(number)) => format!("({}) {}", ddd, number),
        _ => String::new(),
    }
}

/// Party rows and the rows of their representatives.
pub fn party_rows(number: &str, parties: &PartiesBySide) -> (Vec<WorkRecord>, Vec<WorkRecord>) {
    let mut party_rows = Vec::new();
    let mut representative_rows = Vec::new();

    for party in parties.values().flatten() {
        let mut row = WorkRecord::new();
        if let Some(id) = party.id {
            row.insert("ID_PJE", id);
        }
        row.insert("PROCESSO", number);
        row.insert("NOME", party.nome.as_str());
        row.insert(
            "DOCUMENTO",
            party.documento.as_deref().unwrap_or("000.000.000-00"),
        );
        row.insert(
            "TIPO_DOCUMENTO",
            party.tipo_documento.as_deref().unwrap_or("Não Informado"),
        );
        row.insert("TIPO_PESSOA", person_kind(party.tipo_pessoa.as_deref()));
        row.insert("POLO", text(&party.polo));
        row.insert("PARTE_PRINCIPAL", yes_no(party.principal.unwrap_or(false)));
        party_rows.push(row);

        for rep in &party.representantes {
            let mut row = WorkRecord::new();
            if let Some(id) = rep.id {
                row.insert("ID_PJE", id);
            }
            row.insert("PROCESSO", number);
            row.insert("NOME", rep.nome.as_str());
            row.insert("DOCUMENTO", text(&rep.documento));
            row.insert("TIPO_DOCUMENTO", text(&rep.tipo_documento));
            row.insert("REPRESENTADO", party.nome.as_str());
            row.insert("TIPO_PESSOA", person_kind(rep.tipo_pessoa.as_deref()));
            row.insert("POLO", text(&rep.polo));
            row.insert("OAB", rep.numero_oab.as_deref().unwrap_or("0000"));
            row.insert("EMAILS", rep.emails.join(","));
            row.insert("TELEFONE", phone(rep));
            representative_rows.push(row);
        }
    }

    (party_rows, representative_rows)
}

// src/states.rs
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

static STATE_NAMES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("AC", "Acre"),
        ("AL", "Alagoas"),
        ("AP", "Amapá"),
        ("AM", "Amazonas"),
        ("BA", "Bahia"),
        ("CE", "Ceará"),
        ("DF", "Distrito Federal"),
        ("ES", "Espírito Santo"),
        ("GO", "Goiás"),
        ("MA", "Maranhão"),
        ("MT", "Mato Grosso"),
        ("MS", "Mato Grosso do Sul"),
        ("MG", "Minas Gerais"),
        ("PA", "Pará"),
        ("PB", "Paraíba"),
        ("PR", "Paraná"),
        ("PE", "Pernambuco"),
        ("PI", "Piauí"),
        ("RJ", "Rio de Janeiro"),
        ("RN", "Rio Grande do Norte"),
        ("RS", "Rio Grande do Sul"),
        ("RO", "Rondônia"),
        ("RR", "Roraima"),
        ("SC", "Santa Catarina"),
        ("SP", "São Paulo"),
        ("SE", "Sergipe"),
        ("TO", "Tocantins"),
    ])
});

/// Display name for a two-letter code, if it is one of the 27 known codes.
pub fn state_name(code: &str) -> Option<&'static str> {
    STATE_NAMES.get(code).copied()
}

/// Label shown next to a code; unknown codes are shown as-is.
pub fn state_label(code: &str) -> String {
    match state_name(code) {
        Some(name) => format!("{} - {}", code, name),
        None => code.to_string(),
    }
}

use arrow::datatypes::DataType;

/// Integer-looking text. Leading zeros ("007") are kept as text so codes
/// survive unchanged.
pub fn looks_integer(raw: &str) -> bool {
    let s = raw.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return false;
    }
    s.parse::<i64>().is_ok()
}

/// Finite float-looking text. Requires a digit, so "NaN"/"inf" stay text,
/// and rejects values that overflow to infinity ("1e400").
pub fn looks_float(raw: &str) -> bool {
    let s = raw.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return false;
    }
    s.bytes().any(|b| b.is_ascii_digit()) && s.parse::<f64>().map_or(false, f64::is_finite)
}

/// Narrowest type every non-null value fits: Int64, then Float64, else Utf8.
pub fn infer_column_type<'a, I>(values: I) -> DataType
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut seen = false;
    let mut all_int = true;
    let mut all_float = true;
    for v in values.into_iter().flatten() {
        seen = true;
        if all_int && !looks_integer(v) {
            all_int = false;
        }
        if all_float && !looks_float(v) {
            all_float = false;
        }
        if !all_int && !all_float {
            return DataType::Utf8;
        }
    }
    match (seen, all_int, all_float) {
        (false, _, _) => DataType::Utf8,
        (true, true, _) => DataType::Int64,
        (true, false, true) => DataType::Float64,
        _ => DataType::Utf8,
    }
}

/// Pandas-style header disambiguation: `a`, `a.1`, `a.2`, …
pub fn dedupe_headers(headers: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(headers.len());
    for h in headers {
        let mut candidate = h.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", h, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

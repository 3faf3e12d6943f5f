/// Trim and collapse internal whitespace of a lab title.
pub(crate) fn normalize_lab_name(value: &str) -> String {
    let cleaned = value.replace(['\u{feff}', '\u{200b}'], "");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Strip a trailing edition marker such as ` (2)` so repeated editions share one base lab.
pub(crate) fn lab_base_name(value: &str) -> String {
    let normalized = normalize_lab_name(value);
    match strip_edition_suffix(&normalized) {
        Some(base) => base.to_string(),
        None => normalized,
    }
}

fn strip_edition_suffix(value: &str) -> Option<&str> {
    let inner = value.strip_suffix(')')?;
    let open = inner.rfind(" (")?;
    let digits = &inner[open + 2..];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(&value[..open])
}

/// Lower-cased, whitespace-collapsed form used for audience comparisons.
pub(crate) fn normalize_audience(value: &str) -> String {
    normalize_lab_name(value).to_lowercase()
}

/// Upper-case and drop the accents that show up in hand-typed acceptance cells.
pub(crate) fn fold_state(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ä' | 'À' | 'Á' | 'Â' | 'Ä' => 'A',
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => 'E',
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
            'ò' | 'ó' | 'ô' | 'ö' | 'Ò' | 'Ó' | 'Ô' | 'Ö' => 'O',
            'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

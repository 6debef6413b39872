//! Markdown document structure (spec §4.2): a document is a sequence of
//! per-page sections; each page may carry a "Specifications" table, a
//! "Key Features" bullet list, and a "USPs" bullet list. Pages are
//! delimited by a heading whose text contains "page" (the PDF→Markdown
//! extractor's own convention is not specified further upstream, so this
//! is the parser's one invented convention — see the ingestion design
//! note for the alternative considered).

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub parent_category: Option<String>,
    pub sub_category: Option<String>,
    pub specification: String,
    pub value: String,
    pub unit: Option<String>,
    pub key_features: Option<String>,
    pub variant_availability: Option<String>,
    pub line_number: i32,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub page_number: i32,
    pub spec_rows: Vec<TableRow>,
    pub key_features: Vec<String>,
    pub usps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    None,
    Specifications,
    KeyFeatures,
    Usps,
}

fn page_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^#{1,3}\s*page\s*(\d+)").unwrap())
}

/// Parses the body (post front-matter) of a brochure document into pages.
pub fn parse_pages(body: &str) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current = Page { page_number: 1, ..Default::default() };
    let mut section = Section::None;
    let mut table_buffer: Vec<(i32, &str)> = Vec::new();
    let mut bullet_buffer = String::new();

    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if let Some(caps) = page_heading_re().captures(trimmed) {
            flush_table(&mut table_buffer, &mut current);
            flush_bullets(&mut bullet_buffer, section, &mut current);
            if !current.spec_rows.is_empty() || !current.key_features.is_empty() || !current.usps.is_empty() {
                pages.push(std::mem::take(&mut current));
            }
            current.page_number = caps[1].parse().unwrap_or(pages.len() as i32 + 1);
            section = Section::None;
            i += 1;
            continue;
        }

        if is_heading(trimmed) {
            flush_table(&mut table_buffer, &mut current);
            flush_bullets(&mut bullet_buffer, section, &mut current);
            section = classify_heading(trimmed);
            i += 1;
            continue;
        }

        if trimmed.is_empty() {
            flush_table(&mut table_buffer, &mut current);
            flush_bullets(&mut bullet_buffer, section, &mut current);
            i += 1;
            continue;
        }

        match section {
            Section::Specifications if is_table_row(trimmed) => {
                table_buffer.push((i as i32 + 1, trimmed));
            }
            Section::KeyFeatures | Section::Usps => {
                if let Some(text) = bullet_text(trimmed) {
                    flush_bullets(&mut bullet_buffer, section, &mut current);
                    bullet_buffer = text.to_string();
                } else {
                    // continuation line of a wrapped bullet
                    if !bullet_buffer.is_empty() {
                        bullet_buffer.push(' ');
                        bullet_buffer.push_str(trimmed);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    flush_table(&mut table_buffer, &mut current);
    flush_bullets(&mut bullet_buffer, section, &mut current);
    if !current.spec_rows.is_empty() || !current.key_features.is_empty() || !current.usps.is_empty() {
        pages.push(current);
    }
    pages
}

fn is_heading(line: &str) -> bool {
    line.starts_with('#')
}

fn classify_heading(line: &str) -> Section {
    let lower = line.trim_start_matches('#').trim().to_lowercase();
    if lower.contains("specification") {
        Section::Specifications
    } else if lower.contains("key feature") {
        Section::KeyFeatures
    } else if lower.contains("usp") {
        Section::Usps
    } else {
        Section::None
    }
}

fn is_table_row(line: &str) -> bool {
    line.contains('|')
}

fn is_separator_row(cells: &[&str]) -> bool {
    cells.iter().all(|c| {
        let c = c.trim();
        !c.is_empty() && c.chars().all(|ch| matches!(ch, '-' | ':' ))
    })
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim().trim_matches('|');
    trimmed.split('|').map(|c| c.trim().to_string()).collect()
}

fn bullet_text(line: &str) -> Option<&str> {
    for prefix in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(rest.trim());
        }
    }
    None
}

fn flush_bullets(buffer: &mut String, section: Section, page: &mut Page) {
    if buffer.is_empty() {
        return;
    }
    let text = std::mem::take(buffer);
    match section {
        Section::KeyFeatures => page.key_features.push(text),
        Section::Usps => page.usps.push(text),
        _ => {}
    }
}

/// Column role assignment by header arity and keyword (spec §4.2: "Column
/// semantics by arity").
#[derive(Debug, Clone, Copy)]
enum Schema {
    Three,
    FourUnit,
    FourKeyFeatures,
    Five,
}

fn detect_schema(header: &[String]) -> Option<Schema> {
    let lower: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    match lower.len() {
        3 => Some(Schema::Three),
        4 => {
            if lower.iter().any(|h| h.contains("key feature")) {
                Some(Schema::FourKeyFeatures)
            } else {
                Some(Schema::FourUnit)
            }
        }
        5 => Some(Schema::Five),
        _ => None,
    }
}

fn flush_table(buffer: &mut Vec<(i32, &str)>, page: &mut Page) {
    if buffer.len() < 2 {
        buffer.clear();
        return;
    }
    let header = split_cells(buffer[0].1);
    let Some(schema) = detect_schema(&header) else {
        buffer.clear();
        return;
    };
    let separator = split_cells(buffer[1].1);
    let sep_refs: Vec<&str> = separator.iter().map(|s| s.as_str()).collect();
    let data_start = if is_separator_row(&sep_refs) { 2 } else { 1 };

    let mut last_category: Option<String> = None;
    let mut last_sub_category: Option<String> = None;

    for &(line_number, raw) in &buffer[data_start..] {
        let cells = split_cells(raw);
        let cell_refs: Vec<&str> = cells.iter().map(|s| s.as_str()).collect();
        if is_separator_row(&cell_refs) {
            continue;
        }
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        if cells == header {
            continue;
        }

        let row = match schema {
            Schema::Three if cells.len() >= 3 => {
                let category = nonempty(&cells[0]).or_else(|| last_category.clone());
                last_category = category.clone();
                TableRow {
                    parent_category: category,
                    sub_category: None,
                    specification: cells[1].clone(),
                    value: cells[2].clone(),
                    line_number,
                    ..Default::default()
                }
            }
            Schema::FourUnit if cells.len() >= 4 => {
                let category = nonempty(&cells[0]).or_else(|| last_category.clone());
                last_category = category.clone();
                TableRow {
                    parent_category: category,
                    sub_category: None,
                    specification: cells[1].clone(),
                    value: cells[2].clone(),
                    unit: nonempty(&cells[3]),
                    line_number,
                    ..Default::default()
                }
            }
            Schema::FourKeyFeatures if cells.len() >= 4 => {
                let category = nonempty(&cells[0]).or_else(|| last_category.clone());
                last_category = category.clone();
                TableRow {
                    parent_category: category,
                    sub_category: None,
                    specification: cells[1].clone(),
                    value: cells[2].clone(),
                    key_features: nonempty(&cells[3]),
                    line_number,
                    ..Default::default()
                }
            }
            Schema::Five if cells.len() >= 5 => {
                let category = nonempty(&cells[0]).or_else(|| last_category.clone());
                let sub_category = nonempty(&cells[1]).or_else(|| last_sub_category.clone());
                last_category = category.clone();
                last_sub_category = sub_category.clone();
                TableRow {
                    parent_category: category,
                    sub_category,
                    specification: cells[2].clone(),
                    value: cells[3].clone(),
                    variant_availability: nonempty(&cells[4]),
                    line_number,
                    ..Default::default()
                }
            }
            _ => continue,
        };
        page.spec_rows.push(row);
    }
    buffer.clear();
}

fn nonempty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_column_table_yields_one_row_per_data_line() {
        let body = "## Specifications\n\
            | Category | Specification | Value |\n\
            |---|---|---|\n\
            | Engine | Displacement | 2.487 L |\n\
            | | Horsepower | 203 hp |\n";
        let pages = parse_pages(body);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].spec_rows.len(), 2);
        assert_eq!(pages[0].spec_rows[0].parent_category.as_deref(), Some("Engine"));
        assert_eq!(pages[0].spec_rows[1].parent_category.as_deref(), Some("Engine"), "continuation row inherits category");
    }

    #[test]
    fn five_column_table_carries_sub_category_and_availability() {
        let body = "## Specifications\n\
            | Parent Category | Sub-Category | Specification | Value | Variant Availability |\n\
            |---|---|---|---|---|\n\
            | Exterior | Colors | Color | Pearl Metallic | Standard |\n";
        let pages = parse_pages(body);
        let row = &pages[0].spec_rows[0];
        assert_eq!(row.sub_category.as_deref(), Some("Colors"));
        assert_eq!(row.variant_availability.as_deref(), Some("Standard"));
    }

    #[test]
    fn key_features_and_usps_are_collected_as_bullets() {
        let body = "## Key Features\n- Android Auto\n- Wireless charging\n\n## USPs\n- Toyota Safety Sense 3.0\n";
        let pages = parse_pages(body);
        assert_eq!(pages[0].key_features, vec!["Android Auto", "Wireless charging"]);
        assert_eq!(pages[0].usps, vec!["Toyota Safety Sense 3.0"]);
    }

    #[test]
    fn page_headings_split_the_document() {
        let body = "# Page 1\n## Specifications\n| Category | Specification | Value |\n|---|---|---|\n| Engine | Displacement | 2.5 L |\n\n\
            # Page 2\n## Specifications\n| Category | Specification | Value |\n|---|---|---|\n| Exterior | Color | Red |\n";
        let pages = parse_pages(body);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 2);
    }

    #[test]
    fn header_and_separator_rows_yield_no_data_rows() {
        let body = "## Specifications\n| Category | Specification | Value |\n|---|---|---|\n";
        let pages = parse_pages(body);
        assert!(pages.is_empty() || pages[0].spec_rows.is_empty());
    }
}

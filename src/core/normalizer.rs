//! Canonical lookup keys for region and city names.
//!
//! Rules are plain ordered tables. Adding an exception means adding a row,
//! never another branch. Anything no rule recognises passes through with only
//! whitespace, punctuation and case cleaned up.

use crate::domain::model::{PlaceKey, PlaceKind};

/// One row of a rewrite table. Patterns are lowercase.
#[derive(Debug, Clone, Copy)]
enum NameRule {
    /// Whole-name replacement.
    Alias {
        from: &'static str,
        to: &'static str,
    },
    /// Leading settlement-type token dropped (`м. Суми` -> `суми`).
    StripPrefix(&'static str),
    /// Ending rewritten on each word and hyphen segment.
    Suffix {
        from: &'static str,
        to: &'static str,
    },
}

use NameRule::{Alias, StripPrefix, Suffix};

const CITY_RULES: &[NameRule] = &[
    Alias { from: "kyiv", to: "київ" },
    Alias { from: "kiev", to: "київ" },
    Alias { from: "kharkiv", to: "харків" },
    Alias { from: "odesa", to: "одеса" },
    Alias { from: "odessa", to: "одеса" },
    Alias { from: "dnipro", to: "дніпро" },
    Alias { from: "dnipropetrovs'k", to: "дніпро" },
    Alias { from: "lviv", to: "львів" },
    Alias { from: "zaporizhzhia", to: "запоріжжя" },
    Alias { from: "zaporizhzhya", to: "запоріжжя" },
    Alias { from: "zaporizhya", to: "запоріжжя" },
    Alias { from: "kryvyi rih", to: "кривий ріг" },
    Alias { from: "kryvyy rih", to: "кривий ріг" },
    Alias { from: "mykolaiv", to: "миколаїв" },
    Alias { from: "mykolayiv", to: "миколаїв" },
    Alias { from: "nikolaev", to: "миколаїв" },
    Alias { from: "vinnytsia", to: "вінниця" },
    Alias { from: "vinnytsya", to: "вінниця" },
    Alias { from: "kherson", to: "херсон" },
    Alias { from: "poltava", to: "полтава" },
    Alias { from: "chernihiv", to: "чернігів" },
    Alias { from: "cherkasy", to: "черкаси" },
    Alias { from: "zhytomyr", to: "житомир" },
    Alias { from: "sumy", to: "суми" },
    Alias { from: "khmelnytskyi", to: "хмельницький" },
    Alias { from: "khmelnytskyy", to: "хмельницький" },
    Alias { from: "chernivtsi", to: "чернівці" },
    Alias { from: "ternopil", to: "тернопіль" },
    Alias { from: "ivano-frankivsk", to: "івано-франківськ" },
    Alias { from: "rivne", to: "рівне" },
    Alias { from: "lutsk", to: "луцьк" },
    Alias { from: "kramatorsk", to: "краматорськ" },
    Alias { from: "kropyvnytskyi", to: "кропивницький" },
    Alias { from: "kremenchuk", to: "кременчук" },
    Alias { from: "bila tserkva", to: "біла церква" },
    Alias { from: "brovary", to: "бровари" },
    Alias { from: "nizhyn", to: "ніжин" },
    Alias { from: "konotop", to: "конотоп" },
    Alias { from: "shostka", to: "шостка" },
    Alias { from: "kupyansk", to: "куп'янськ" },
    Alias { from: "nikopol", to: "нікополь" },
    Alias { from: "uman", to: "умань" },
    Alias { from: "kovel", to: "ковель" },
    Alias { from: "uzhgorod", to: "ужгород" },
    Alias { from: "uzhhorod", to: "ужгород" },
    Alias { from: "korosten", to: "коростень" },
    StripPrefix("м."),
    StripPrefix("м "),
    StripPrefix("смт."),
    StripPrefix("смт "),
    StripPrefix("сел."),
    StripPrefix("с."),
    Suffix { from: "ію", to: "ія" },
    Suffix { from: "ю", to: "я" },
    Suffix { from: "у", to: "а" },
];

const REGION_RULES: &[NameRule] = &[
    Alias { from: "хмельничена", to: "хмельниччина" },
    Alias { from: "хмельниченна", to: "хмельниччина" },
    Alias { from: "хмельничина", to: "хмельниччина" },
    Alias { from: "дніпропетровщіна", to: "дніпропетровщина" },
];

/// Endings marking the formal "<adjective> область" form.
const ADMINISTRATIVE_SUFFIXES: &[&str] = &[" область", " обл.", " обл", " oblast", " region"];

struct Oblast {
    adjective: &'static str,
    latin_stem: &'static str,
    colloquial: &'static str,
}

const OBLASTS: &[Oblast] = &[
    Oblast { adjective: "вінницька", latin_stem: "vinnyts", colloquial: "вінниччина" },
    Oblast { adjective: "волинська", latin_stem: "volyn", colloquial: "волинь" },
    Oblast { adjective: "дніпропетровська", latin_stem: "dnipro", colloquial: "дніпропетровщина" },
    Oblast { adjective: "донецька", latin_stem: "donets", colloquial: "донеччина" },
    Oblast { adjective: "житомирська", latin_stem: "zhytomyr", colloquial: "житомирщина" },
    Oblast { adjective: "закарпатська", latin_stem: "zakarpat", colloquial: "закарпаття" },
    Oblast { adjective: "запорізька", latin_stem: "zaporiz", colloquial: "запоріжжя" },
    Oblast { adjective: "івано-франківська", latin_stem: "ivano-frankivs", colloquial: "івано-франківщина" },
    Oblast { adjective: "київська", latin_stem: "kyiv", colloquial: "київщина" },
    Oblast { adjective: "кіровоградська", latin_stem: "kirovohrad", colloquial: "кіровоградщина" },
    Oblast { adjective: "луганська", latin_stem: "luhans", colloquial: "луганщина" },
    Oblast { adjective: "львівська", latin_stem: "lviv", colloquial: "львівщина" },
    Oblast { adjective: "миколаївська", latin_stem: "mykolai", colloquial: "миколаївщина" },
    Oblast { adjective: "одеська", latin_stem: "odes", colloquial: "одещина" },
    Oblast { adjective: "полтавська", latin_stem: "poltav", colloquial: "полтавщина" },
    Oblast { adjective: "рівненська", latin_stem: "rivne", colloquial: "рівненщина" },
    Oblast { adjective: "сумська", latin_stem: "sum", colloquial: "сумщина" },
    Oblast { adjective: "тернопільська", latin_stem: "ternopil", colloquial: "тернопільщина" },
    Oblast { adjective: "харківська", latin_stem: "kharkiv", colloquial: "харківщина" },
    Oblast { adjective: "херсонська", latin_stem: "kherson", colloquial: "херсонщина" },
    Oblast { adjective: "хмельницька", latin_stem: "khmelnyts", colloquial: "хмельниччина" },
    Oblast { adjective: "черкаська", latin_stem: "cherkas", colloquial: "черкащина" },
    Oblast { adjective: "чернівецька", latin_stem: "chernivts", colloquial: "чернівеччина" },
    Oblast { adjective: "чернігівська", latin_stem: "chernihiv", colloquial: "чернігівщина" },
];

/// Segments this short are prepositions or initials, never inflected names.
const MIN_INFLECTED_SEGMENT_CHARS: usize = 3;

pub fn normalize(raw: &str, kind: PlaceKind) -> PlaceKey {
    let cleaned = clean(raw, kind);
    let canonical = match kind {
        PlaceKind::City => apply_rules(&cleaned, CITY_RULES),
        PlaceKind::Region => normalize_region(&cleaned),
    };
    PlaceKey::from_normalized(title_case(&canonical))
}

fn clean(raw: &str, kind: PlaceKind) -> String {
    let unified: String = raw
        .chars()
        .map(|c| match c {
            '’' | 'ʼ' | '`' | '‘' => '\'',
            other => other,
        })
        .collect();

    let collapsed = unified.split_whitespace().collect::<Vec<_>>().join(" ");
    let trailing: &[char] = match kind {
        // "обл." keeps its dot so the administrative suffix still matches.
        PlaceKind::Region => &[':', ',', ';', '!'],
        PlaceKind::City => &[':', ',', ';', '!', '.'],
    };
    collapsed
        .trim_end_matches(trailing)
        .trim()
        .to_lowercase()
}

fn apply_rules(name: &str, rules: &[NameRule]) -> String {
    if let Some(to) = rules.iter().find_map(|rule| match rule {
        Alias { from, to } if *from == name => Some(*to),
        _ => None,
    }) {
        return to.to_string();
    }

    let stripped = rules
        .iter()
        .find_map(|rule| match rule {
            StripPrefix(prefix) => name.strip_prefix(*prefix).map(str::trim_start),
            _ => None,
        })
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name);

    let suffixes: Vec<(&str, &str)> = rules
        .iter()
        .filter_map(|rule| match rule {
            Suffix { from, to } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    if suffixes.is_empty() {
        return stripped.to_string();
    }

    map_segments(stripped, |segment| rewrite_suffix(segment, &suffixes))
}

fn rewrite_suffix(segment: &str, suffixes: &[(&str, &str)]) -> String {
    if segment.chars().count() < MIN_INFLECTED_SEGMENT_CHARS {
        return segment.to_string();
    }
    for (from, to) in suffixes {
        if let Some(stem) = segment.strip_suffix(*from) {
            return format!("{}{}", stem, to);
        }
    }
    segment.to_string()
}

fn normalize_region(name: &str) -> String {
    let corrected = apply_rules(name, REGION_RULES);

    for suffix in ADMINISTRATIVE_SUFFIXES {
        let Some(adjective) = corrected.strip_suffix(suffix) else {
            continue;
        };
        let adjective = adjective.trim();
        let colloquial = OBLASTS.iter().find(|oblast| {
            oblast.adjective == adjective || adjective.starts_with(oblast.latin_stem)
        });
        return match colloquial {
            Some(oblast) => oblast.colloquial.to_string(),
            None => corrected,
        };
    }

    corrected
}

/// Applies `f` to every word and hyphen-separated segment, keeping separators.
fn map_segments(name: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(name.len());
    let mut segment = String::new();
    for c in name.chars() {
        if c == ' ' || c == '-' {
            out.push_str(&f(&segment));
            out.push(c);
            segment.clear();
        } else {
            segment.push(c);
        }
    }
    out.push_str(&f(&segment));
    out
}

fn title_case(name: &str) -> String {
    map_segments(name, |segment| {
        let mut chars = segment.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    })
}

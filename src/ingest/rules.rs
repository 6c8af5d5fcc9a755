// src/ingest/rules.rs
//! Ordered (pattern, outcome) tables. The first matching rule wins. Tables are
//! plain data so tests can walk every rule without going through rendering.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::localtime::Locale;

pub struct Rule<T: 'static> {
    pub pattern: &'static str,
    pub outcome: T,
}

/// Compiled view over a static rule table.
pub struct RuleSet<T: 'static> {
    compiled: Vec<(Regex, &'static T)>,
}

impl<T: 'static> RuleSet<T> {
    pub fn compile(rules: &'static [Rule<T>]) -> Self {
        let compiled = rules
            .iter()
            .map(|r| {
                // Patterns are compile-time constants covered by tests.
                let re = Regex::new(r.pattern).expect("rule pattern");
                (re, &r.outcome)
            })
            .collect();
        Self { compiled }
    }

    pub fn first_match(&self, text: &str) -> Option<&'static T> {
        self.compiled
            .iter()
            .find(|(re, _)| re.is_match(text))
            .map(|(_, outcome)| *outcome)
    }
}

/// Markup importance signal -> star count. Higher tiers come first.
/// Rows that match nothing default to 2 stars.
pub static IMPORTANCE_RULES: &[Rule<u8>] = &[
    Rule {
        pattern: r"(?s)(?:FullBullishIcon.*?){3}",
        outcome: 3,
    },
    Rule {
        pattern: r"(?i)bull(?:3|ish\s*3)|star.?3|\balta\b|\bhigh\b",
        outcome: 3,
    },
    Rule {
        pattern: r"(?i)bull(?:2|ish\s*2)|star.?2|\bmedia\b|\bmedium\b",
        outcome: 2,
    },
];

pub const DEFAULT_MARKUP_STARS: u8 = 2;

pub static IMPORTANCE: Lazy<RuleSet<u8>> = Lazy::new(|| RuleSet::compile(IMPORTANCE_RULES));

/// Topic prefix added in front of a title.
pub static DECORATION_RULES: &[Rule<&str>] = &[
    Rule {
        pattern: r"(?i)powell|fomc|\bfed\b",
        outcome: "🗣️",
    },
    Rule {
        pattern: r"(?i)payroll|\bnfp\b|non-?farm|no agrícola|unemployment|employment|jobless|desempleo|empleo",
        outcome: "📊",
    },
    Rule {
        pattern: r"(?i)\bcpi\b|\bipc\b|\bpce\b|price|inflation|inflaci|precio",
        outcome: "💰",
    },
    Rule {
        pattern: r"(?i)retail|sales|minorista|ventas",
        outcome: "🛒",
    },
];

pub static DECORATION: Lazy<RuleSet<&str>> = Lazy::new(|| RuleSet::compile(DECORATION_RULES));

/// English -> Spanish title substitutions, applied in order.
pub static TRANSLATIONS_ES: &[Rule<&str>] = &[
    Rule {
        pattern: r"(?i)Unemployment Claims",
        outcome: "Peticiones de subsidio por desempleo",
    },
    Rule {
        pattern: r"(?i)Non-?farm (?:Employment Change|Payrolls)",
        outcome: "Empleo no agrícola (NFP)",
    },
    Rule {
        pattern: r"(?i)Unemployment Rate",
        outcome: "Tasa de desempleo",
    },
    Rule {
        pattern: r"(?i)FOMC Minutes",
        outcome: "Minutas del FOMC",
    },
    Rule {
        pattern: r"(?i)FOMC Statement",
        outcome: "Declaración FOMC",
    },
    Rule {
        pattern: r"(?i)Average Hourly Earnings",
        outcome: "Salario medio por hora",
    },
    Rule {
        pattern: r"(?i)Powell Speaks",
        outcome: "Discurso de Powell (Fed)",
    },
    Rule {
        pattern: r"(?i)Retail Sales",
        outcome: "Ventas minoristas",
    },
    Rule {
        pattern: r"\bCPI\b",
        outcome: "IPC",
    },
];

static TRANSLATIONS_ES_COMPILED: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    TRANSLATIONS_ES
        .iter()
        .map(|r| (Regex::new(r.pattern).expect("translation pattern"), r.outcome))
        .collect()
});

/// Short explanation per topic: (english, spanish).
pub static DESCRIPTION_RULES: &[Rule<(&str, &str)>] = &[
    Rule {
        pattern: r"(?i)continuing (?:jobless )?claims",
        outcome: (
            "Continuing claims, pressure on the labour market.",
            "Demandantes de paro continuados (presión sobre mercado laboral).",
        ),
    },
    Rule {
        pattern: r"(?i)unemployment claims|jobless claims",
        outcome: (
            "Weekly jobless claims, a cycle indicator.",
            "Solicitudes semanales de paro (indicador de ciclo).",
        ),
    },
    Rule {
        pattern: r"(?i)non-?farm|payroll|\bnfp\b",
        outcome: (
            "Nonfarm payrolls, the key monthly labour market print.",
            "Empleo no agrícola: referencia mensual clave del mercado laboral.",
        ),
    },
    Rule {
        pattern: r"(?i)unemployment rate",
        outcome: (
            "Share of the labour force out of work.",
            "Porcentaje de parados vs fuerza laboral.",
        ),
    },
    Rule {
        pattern: r"(?i)average hourly earnings",
        outcome: (
            "Wage growth, a source of inflation pressure.",
            "Crecimiento salarial (tensión inflacionaria).",
        ),
    },
    Rule {
        pattern: r"(?i)consumer price|\bcpi\b",
        outcome: ("Consumer price inflation.", "Inflación IPC (precios al consumo)."),
    },
    Rule {
        pattern: r"(?i)\bpce\b",
        outcome: (
            "PCE inflation, the Fed's preferred gauge.",
            "Inflación PCE (indicador favorito de la Fed).",
        ),
    },
    Rule {
        pattern: r"(?i)retail sales",
        outcome: (
            "Consumer spending, the main GDP driver.",
            "Gasto del consumidor (motor del PIB).",
        ),
    },
    Rule {
        pattern: r"(?i)fomc.*minutes",
        outcome: (
            "Minutes of the Fed meeting, hints on forward guidance.",
            "Acta de la reunión de la Fed; pistas de orientación futura.",
        ),
    },
    Rule {
        pattern: r"(?i)powell|fed chair.*speaks",
        outcome: (
            "Remarks by the Fed chair, can move rate expectations.",
            "Comentarios de Powell con impacto potencial en expectativas.",
        ),
    },
];

pub static DESCRIPTIONS: Lazy<RuleSet<(&str, &str)>> =
    Lazy::new(|| RuleSet::compile(DESCRIPTION_RULES));

pub fn markup_stars(signal: &str) -> u8 {
    IMPORTANCE
        .first_match(signal)
        .copied()
        .unwrap_or(DEFAULT_MARKUP_STARS)
}

/// Apply the translation table for `locale`; English titles pass through.
pub fn translate_title(title: &str, locale: Locale) -> String {
    match locale {
        Locale::En => title.to_string(),
        Locale::Es => TRANSLATIONS_ES_COMPILED
            .iter()
            .fold(title.to_string(), |acc, (re, to)| re.replace_all(&acc, *to).into_owned()),
    }
}

/// Prefix the topic emoji, if any rule matches.
pub fn decorate_title(title: &str) -> String {
    match DECORATION.first_match(title) {
        Some(prefix) => format!("{prefix} {title}"),
        None => title.to_string(),
    }
}

/// Short description for `title` (matched on the untranslated title).
pub fn describe(title: &str, locale: Locale) -> Option<&'static str> {
    DESCRIPTIONS.first_match(title).map(|(en, es)| match locale {
        Locale::En => *en,
        Locale::Es => *es,
    })
}

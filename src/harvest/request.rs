//! Page request construction. Pure: building a payload or a referer has no
//! side effects and no error cases.

use serde_json::{Map, Value};

const REFERER_BASE: &str = "https://nmdc.cn/gcpathogen/pathogens?type=";

/// Pathogen category in the GCPathogen catalogue. Closed set; extending the
/// tool to a new category means adding a variant here and to `ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Bacteria,
    Virus,
    Fungi,
    Parasite,
}

impl Category {
    /// All categories in the order the full harvest runs them.
    pub const ALL: [Category; 4] = [
        Category::Bacteria,
        Category::Fungi,
        Category::Virus,
        Category::Parasite,
    ];

    /// Wire value used in the payload `type` field and the referer query.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bacteria => "bacteria",
            Category::Virus => "virus",
            Category::Fungi => "fungi",
            Category::Parasite => "parasite",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Referer for one request, derived from the category alone. Computed fresh
/// per request; there is no long-lived header map to mutate.
pub fn referer_for(category: Category) -> String {
    format!("{}{}", REFERER_BASE, category.as_str())
}

/// One page query: category, 1-based page number, page size, and optional
/// filter overrides (all filters default to empty strings on the wire).
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub category: Category,
    pub page: u32,
    pub page_size: u32,
    pub filters: Vec<(String, String)>,
}

/// Every filter field the endpoint expects, sent as an empty string unless
/// overridden. The server rejects bodies with missing keys, so the full set
/// is always present.
const FILTER_FIELDS: [&str; 37] = [
    "high",
    "seaechStrainName",
    "searchAssembly",
    "searchAssemblyLevel",
    "searchAssemblyMethod",
    "searchContigsEnd",
    "searchContigsStart",
    "searchCountry",
    "searchDisease",
    "searchHost",
    "searchGene",
    "searchIsoSource",
    "searchLevel",
    "searchMLST",
    "searchPathogenName",
    "searchSequencing",
    "searchSubmitter",
    "searchTaxonid",
    "searchAroName",
    "searchVFName",
    "ispublic",
    "searchDate",
    "pathogen",
    "host",
    "level",
    "disease",
    "country",
    "date",
    "aroName",
    "vf_name",
    "isoSource",
    "searchGenome",
    "pathogenName",
    "gramStain",
    "genomeType",
    "searchGenomeType",
    "searchGramStain",
];

impl PageRequest {
    /// Build a request with no filters set.
    pub fn new(category: Category, page: u32, page_size: u32) -> Self {
        Self {
            category,
            page,
            page_size,
            filters: Vec::new(),
        }
    }

    /// Render the JSON wire body. Deterministic for a given request: fixed
    /// field order, all unset filters as empty strings.
    pub fn payload(&self) -> Value {
        let mut body = Map::new();
        body.insert("otherType".into(), Value::String("taxa".into()));
        body.insert("page".into(), Value::from(self.page));
        body.insert("size".into(), Value::from(self.page_size));
        body.insert("type".into(), Value::String(self.category.as_str().into()));
        for field in FILTER_FIELDS {
            body.insert(field.into(), Value::String(String::new()));
        }
        for (name, value) in &self.filters {
            body.insert(name.clone(), Value::String(value.clone()));
        }
        Value::Object(body)
    }
}

use serde::{Deserialize, Serialize};

/// Placeholder used in reference identifiers for an unknown rank.
const MISSING: &str = ".";

/// Taxonomy encoded in a reference sequence identifier.
///
/// Identifiers carry up to eight `;`-separated fields in the order
/// accession, kingdom, phylum, class, order, family, genus, species.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    pub accession: Option<String>,
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub family: Option<String>,
    pub genus: Option<String>,
    pub species: Option<String>,
}

impl Taxonomy {
    pub fn from_subject_id(subject_id: &str) -> Self {
        if !subject_id.contains(';') {
            // No rank structure: the identifier names both the record and the organism.
            let opaque = field(subject_id);
            return Self {
                accession: opaque.clone(),
                species: opaque,
                ..Self::default()
            };
        }

        let mut parts = subject_id.split(';').map(field);
        let mut next = || parts.next().flatten();
        Self {
            accession: next(),
            kingdom: next(),
            phylum: next(),
            class: next(),
            order: next(),
            family: next(),
            genus: next(),
            species: next(),
        }
    }

    /// Ranks in identifier order.
    pub fn fields(&self) -> [Option<&str>; 8] {
        [
            self.accession.as_deref(),
            self.kingdom.as_deref(),
            self.phylum.as_deref(),
            self.class.as_deref(),
            self.order.as_deref(),
            self.family.as_deref(),
            self.genus.as_deref(),
            self.species.as_deref(),
        ]
    }
}

fn field(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw == MISSING {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_identifier() {
        let tax = Taxonomy::from_subject_id(
            "UDB0123;k__Fungi;p__Ascomycota;c__Sordariomycetes;o__Hypocreales;f__Nectriaceae;g__Fusarium;s__Fusarium_oxysporum",
        );
        assert_eq!(tax.accession.as_deref(), Some("UDB0123"));
        assert_eq!(tax.kingdom.as_deref(), Some("k__Fungi"));
        assert_eq!(tax.genus.as_deref(), Some("g__Fusarium"));
        assert_eq!(tax.species.as_deref(), Some("s__Fusarium_oxysporum"));
    }

    #[test]
    fn placeholders_and_short_identifiers_are_absent() {
        let tax = Taxonomy::from_subject_id("AB1;k__Fungi;.;c__X");
        assert_eq!(tax.accession.as_deref(), Some("AB1"));
        assert_eq!(tax.kingdom.as_deref(), Some("k__Fungi"));
        assert_eq!(tax.phylum, None);
        assert_eq!(tax.class.as_deref(), Some("c__X"));
        assert_eq!(tax.order, None);
        assert_eq!(tax.species, None);
    }

    #[test]
    fn populated_prefix_roundtrips() {
        let ranks = ["acc", "k", "p", "c", "o", "f", "g", "s"];
        for n in 1..=8 {
            let mut parts: Vec<&str> = ranks[..n].to_vec();
            parts.resize(8, ".");
            let tax = Taxonomy::from_subject_id(&parts.join(";"));
            let fields = tax.fields();
            for (i, value) in fields.iter().enumerate() {
                if i < n {
                    assert_eq!(*value, Some(ranks[i]), "rank {i} with {n} populated");
                } else {
                    assert_eq!(*value, None, "rank {i} with {n} populated");
                }
            }
        }
    }

    #[test]
    fn identifier_without_semicolon_is_opaque() {
        let tax = Taxonomy::from_subject_id("MN123456.1");
        assert_eq!(tax.accession.as_deref(), Some("MN123456.1"));
        assert_eq!(tax.species.as_deref(), Some("MN123456.1"));
        assert_eq!(tax.kingdom, None);
        assert_eq!(tax.genus, None);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let tax = Taxonomy::from_subject_id("a;b;c;d;e;f;g;h;extra");
        assert_eq!(tax.species.as_deref(), Some("h"));
    }
}

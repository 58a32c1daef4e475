//! DXCC entity lookup through the country file.
//!
//! `cty.dat` knows more callsigns than the DXCC list but names countries
//! differently, and also lists WAEDC-only countries that are part of a
//! DXCC entity. Names are mapped through two static tables before looking
//! them up in the current DXCC list.

use crate::cty::{Country, PrefixTable};
use crate::dxcc::{DxccList, Entity};

/// Countries that `cty.dat` and the DXCC list spell differently.
static CTY_TO_DXCC: &[(&str, &str)] = &[
    ("Agalega & St. Brandon", "Agalega & St. Brandon Is."),
    ("Aland Islands", "Aland Is."),
    ("Annobon Island", "Annobon I."),
    ("Ascension Island", "Ascension I."),
    ("Asiatic Turkey", "Turkey"),
    ("Austral Islands", "Austral I."),
    ("Aves Island", "Aves I."),
    ("Baker & Howland Islands", "Baker & Howland Is."),
    ("Balearic Islands", "Balearic Is."),
    ("Banaba Island", "Banaba I. (Ocean I.)"),
    ("British Virgin Islands", "British Virgin Is."),
    ("Canary Islands", "Canary Is."),
    ("Cayman Islands", "Cayman Is."),
    ("Central African Republic", "Central Africa"),
    ("Central Kiribati", "C. Kiribati (British Phoenix Is.)"),
    ("Chagos Islands", "Chagos Is."),
    ("Chatham Islands", "Chatham Is."),
    ("Chesterfield Islands", "Chesterfield Is."),
    ("Christmas Island", "Christmas I."),
    ("Clipperton Island", "Clipperton I."),
    ("Cocos (Keeling) Islands", "Cocos (Keeling) Is."),
    ("Cocos Island", "Cocos I."),
    ("Crozet Island", "Crozet I."),
    ("DPR of Korea", "Democratic People's Rep. of Korea"),
    ("Dem. Rep. of the Congo", "Democratic Republic of the Congo"),
    ("Desecheo Island", "Desecheo I."),
    ("Ducie Island", "Ducie I."),
    ("Easter Island", "Easter I."),
    ("Eastern Kiribati", "E. Kiribati (Line Is.)"),
    ("Falkland Islands", "Falkland Is."),
    ("Faroe Islands", "Faroe Is."),
    ("Fed. Rep. of Germany", "Federal Republic of Germany"),
    ("Galapagos Islands", "Galapagos Is."),
    ("Glorioso Islands", "Glorioso Is."),
    ("Heard Island", "Heard I."),
    ("Johnston Island", "Johnston I."),
    ("Juan Fernandez Islands", "Juan Fernandez Is."),
    ("Kerguelen Islands", "Kerguelen Is."),
    ("Kermadec Islands", "Kermadec Is."),
    ("Kingdom of Eswatini", "Swaziland"),
    ("Kure Island", "Kure I."),
    ("Lakshadweep Islands", "Lakshadweep Is."),
    ("Lord Howe Island", "Lord Howe I."),
    ("Macquarie Island", "Macquarie I."),
    ("Madeira Islands", "Madeira Is."),
    ("Malpelo Island", "Malpelo I."),
    ("Mariana Islands", "Mariana Is."),
    ("Marquesas Islands", "Marquesas Is."),
    ("Marshall Islands", "Marshall Is."),
    ("Midway Island", "Midway I."),
    ("N.Z. Subantarctic Is.", "New Zealand Subantarctic Islands"),
    ("Navassa Island", "Navassa I."),
    ("Norfolk Island", "Norfolk I."),
    ("North Cook Islands", "North Cook Is."),
    ("North Macedonia", "North Macedonia (Republic of)"),
    ("Palmyra & Jarvis Islands", "Palmyra & Jarvis Is"),
    ("Peter 1 Island", "Peter 1 I."),
    ("Pitcairn Island", "Pitcairn I."),
    ("Pr. Edward & Marion Is.", "Prince Edward & Marion Is."),
    ("Pratas Island", "Pratas I."),
    ("Republic of South Sudan", "South Sudan (Republic of)"),
    ("Reunion Island", "Reunion I."),
    ("Rodriguez Island", "Rodrigues I."),
    ("Rotuma Island", "Rotuma I."),
    ("Sable Island", "Sable I."),
    ("Solomon Islands", "Solomon Is."),
    ("South Cook Islands", "South Cook Is."),
    ("South Georgia Island", "South Georgia I."),
    ("South Orkney Islands", "South Orkney Is."),
    ("South Sandwich Islands", "South Sandwich Is."),
    ("South Shetland Islands", "South Shetland Is."),
    ("Sov Mil Order of Malta", "Sovereign Military Order of Malta"),
    ("Spratly Islands", "Spratly Is."),
    ("St. Barthelemy", "Saint Barthelemy"),
    ("St. Martin", "Saint Martin"),
    ("St. Paul Island", "St. Paul I."),
    ("St. Peter & St. Paul", "St. Peter & St. Paul Rocks"),
    ("Swains Island", "Swains I."),
    ("Timor - Leste", "Timor-Leste"),
    ("Tokelau Islands", "Tokelau Is."),
    ("Trindade & Martim Vaz", "Trindade & Martim Vaz Is."),
    ("Tristan da Cunha & Gough", "Tristan da Cunha & Gough I."),
    ("Tromelin Island", "Tromelin I."),
    ("Turks & Caicos Islands", "Turks & Caicos Is."),
    ("UK Base Areas on Cyprus", "UK Sovereign Base Areas on Cyprus"),
    ("US Virgin Islands", "Virgin Is."),
    ("United States", "United States of America"),
    ("Vatican City", "Vatican"),
    ("Vietnam", "Viet Nam"),
    ("Wake Island", "Wake I."),
    ("Wallis & Futuna Islands", "Wallis & Futuna Is."),
    ("Western Kiribati", "W. Kiribati (Gilbert Is. )"),
    ("Willis Island", "Willis I."),
];

/// WAEDC-only countries and the DXCC entity they belong to.
static WAE_TO_DXCC: &[(&str, &str)] = &[
    ("African Italy", "Italy"),
    ("Bear Island", "Svalbard"),
    ("European Turkey", "Turkey"),
    ("Shetland Islands", "Scotland"),
    ("Sicily", "Italy"),
    ("Vienna Intl Ctr", "Austria"),
];

fn lookup_table(table: &'static [(&'static str, &'static str)], name: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| *from == name)
        .map(|&(_, to)| to)
}

/// The DXCC list name of a `cty.dat` country.
pub fn dxcc_name(cty_name: &str) -> &str {
    let name = lookup_table(WAE_TO_DXCC, cty_name).unwrap_or(cty_name);
    lookup_table(CTY_TO_DXCC, name).unwrap_or(name)
}

/// Callsign to DXCC entity resolver combining a country file with the
/// current DXCC list.
#[derive(Debug, Clone)]
pub struct CtyDxcc {
    cty: PrefixTable,
    dxcc: DxccList,
}

impl CtyDxcc {
    pub fn new(cty: PrefixTable, dxcc: DxccList) -> Self {
        Self { cty, dxcc }
    }

    /// The entity of a callsign, if the country file knows the callsign
    /// and its country maps to a DXCC entity.
    pub fn resolve(&self, callsign: &str) -> Option<&Entity> {
        let country = self.cty.lookup(callsign)?;
        self.dxcc.by_name(dxcc_name(&country.name))
    }

    /// Like [`resolve`](Self::resolve), as a list of at most one entity so
    /// results compare directly with [`DxccList::lookup`].
    pub fn lookup(&self, callsign: &str) -> Vec<&Entity> {
        self.resolve(callsign).into_iter().collect()
    }

    /// Countries of the country file that map to no DXCC entity.
    pub fn unmatched_countries(&self) -> Vec<&Country> {
        self.cty
            .countries()
            .iter()
            .filter(|country| self.dxcc.by_name(dxcc_name(&country.name)).is_none())
            .collect()
    }

    pub fn cty(&self) -> &PrefixTable {
        &self.cty
    }

    pub fn dxcc(&self) -> &DxccList {
        &self.dxcc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTY: &str = "\
Austria:                  15:  28:  EU:   47.33:   -13.33:    -1.0:  OE:
    OE;
Vienna Intl Ctr:          15:  28:  EU:   48.20:   -16.30:    -1.0:  *4U1V:
    =4U1VIC;
United States:            05:  08:  NA:   37.53:    91.67:     5.0:  K:
    K,N,W;
Canary Islands:           33:  36:  AF:   28.32:    15.85:     0.0:  EA8:
    EA8;
Atlantis:                 40:  75:  EU:    0.00:     0.00:     0.0:  AT:
    AT;
";

    const DXCC: &str = "ARRL DXCC LIST
CURRENT ENTITIES
_____ _____ _____ _____ _____
   EA8           Canary Is.                   AF     36    33    029
   K,W,N         United States of America     NA   06-08 03-05   291
   OE            Austria                      EU     28    15    206
";

    fn resolver() -> CtyDxcc {
        CtyDxcc::new(
            PrefixTable::parse_str(CTY).unwrap(),
            DxccList::parse_str(DXCC).unwrap(),
        )
    }

    #[test]
    fn test_dxcc_name() {
        assert_eq!(dxcc_name("Canary Islands"), "Canary Is.");
        assert_eq!(dxcc_name("Vienna Intl Ctr"), "Austria");
        assert_eq!(dxcc_name("Asiatic Turkey"), "Turkey");
        assert_eq!(dxcc_name("European Turkey"), "Turkey");
        assert_eq!(dxcc_name("Austria"), "Austria");
    }

    #[test]
    fn test_resolve_through_equivalence_table() {
        let resolver = resolver();
        let entity = resolver.resolve("W1AW").unwrap();
        assert_eq!(entity.code, 291);
        assert_eq!(resolver.resolve("EA8ABC").unwrap().name, "Canary Is.");
    }

    #[test]
    fn test_resolve_through_alias_table() {
        let resolver = resolver();
        assert_eq!(resolver.resolve("4U1VIC").unwrap().name, "Austria");
    }

    #[test]
    fn test_lookup_is_a_list() {
        let resolver = resolver();
        assert_eq!(resolver.lookup("OE3RSU").len(), 1);
        assert!(resolver.lookup("ZZ1ZZ").is_empty());
        // Known to cty.dat but not a DXCC entity.
        assert!(resolver.lookup("AT1ABC").is_empty());
    }

    #[test]
    fn test_unmatched_countries() {
        let resolver = resolver();
        let unmatched: Vec<_> = resolver
            .unmatched_countries()
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(unmatched, ["Atlantis"]);
    }

    #[test]
    fn test_tables_have_unique_keys() {
        for table in [CTY_TO_DXCC, WAE_TO_DXCC] {
            let mut keys: Vec<_> = table.iter().map(|(from, _)| *from).collect();
            keys.sort_unstable();
            keys.dedup();
            assert_eq!(keys.len(), table.len());
        }
    }
}

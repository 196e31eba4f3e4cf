// crates/engine/src/knowledge.rs
//! Embedded antimicrobial reference tables.
//!
//! A deliberately small curated subset: common isolates from urine, blood
//! and respiratory panels, the resistance genes those panels report, and
//! the ICD-10 codes the intake form offers. Therapy rows are looked up by
//! organism name or alias, case-insensitively.

/// Recommendation tier for a therapy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    First,
    Second,
    Alternative,
}

/// One curated therapy recommendation.
pub struct TherapyRef {
    pub pathogen: &'static str,
    pub aliases: &'static [&'static str],
    pub tier: Tier,
    pub agent: &'static str,
    /// Medication class, matched against allergies and gene-affected classes.
    pub class: &'static str,
    pub route: &'static str,
    /// `dose,route,frequency,duration` as the source material records it.
    pub dose_duration: &'static str,
    pub renal_adjustment: Option<&'static str>,
    pub considerations: Option<&'static str>,
}

/// One curated resistance-gene commentary row.
pub struct GeneRef {
    pub gene: &'static str,
    pub class_affected: &'static str,
    pub considerations: &'static str,
}

/// ICD-10 code to diagnosis name.
pub struct IcdRef {
    pub code: &'static str,
    pub name: &'static str,
}

pub const THERAPIES: &[TherapyRef] = &[
    // Escherichia coli
    TherapyRef {
        pathogen: "Escherichia coli",
        aliases: &["E. coli"],
        tier: Tier::First,
        agent: "Nitrofurantoin",
        class: "nitrofurans",
        route: "oral",
        dose_duration: "100 mg,oral,BID,5 days",
        renal_adjustment: Some("avoid if CrCl < 30 mL/min"),
        considerations: Some("uncomplicated lower urinary tract infection only"),
    },
    TherapyRef {
        pathogen: "Escherichia coli",
        aliases: &["E. coli"],
        tier: Tier::Second,
        agent: "Trimethoprim-sulfamethoxazole",
        class: "sulfonamides",
        route: "oral",
        dose_duration: "160/800 mg,oral,BID,3 days",
        renal_adjustment: Some("reduce dose if CrCl < 30 mL/min"),
        considerations: Some("confirm local resistance rate below 20%"),
    },
    TherapyRef {
        pathogen: "Escherichia coli",
        aliases: &["E. coli"],
        tier: Tier::Second,
        agent: "Ceftriaxone",
        class: "cephalosporins",
        route: "IV",
        dose_duration: "1 g,IV,daily,7 days",
        renal_adjustment: None,
        considerations: Some("for pyelonephritis or systemic involvement"),
    },
    TherapyRef {
        pathogen: "Escherichia coli",
        aliases: &["E. coli"],
        tier: Tier::Alternative,
        agent: "Fosfomycin",
        class: "phosphonic acid derivatives",
        route: "oral",
        dose_duration: "3 g,oral,single dose,null",
        renal_adjustment: None,
        considerations: Some("single-dose option for cystitis"),
    },
    // Staphylococcus aureus
    TherapyRef {
        pathogen: "Staphylococcus aureus",
        aliases: &["S. aureus"],
        tier: Tier::First,
        agent: "Cefazolin",
        class: "cephalosporins",
        route: "IV",
        dose_duration: "2 g,IV,q8h,14 days",
        renal_adjustment: Some("extend interval if CrCl < 35 mL/min"),
        considerations: Some("methicillin-susceptible isolates"),
    },
    TherapyRef {
        pathogen: "Staphylococcus aureus",
        aliases: &["S. aureus"],
        tier: Tier::Second,
        agent: "Vancomycin",
        class: "glycopeptides",
        route: "IV",
        dose_duration: "15-20 mg/kg,IV,q8-12h,null",
        renal_adjustment: Some("dose by trough levels"),
        considerations: Some("first line when mecA is detected"),
    },
    TherapyRef {
        pathogen: "Staphylococcus aureus",
        aliases: &["S. aureus"],
        tier: Tier::Alternative,
        agent: "Linezolid",
        class: "oxazolidinones",
        route: "oral",
        dose_duration: "600 mg,oral,BID,10 days",
        renal_adjustment: None,
        considerations: Some("monitor for thrombocytopenia beyond 14 days"),
    },
    // Klebsiella pneumoniae
    TherapyRef {
        pathogen: "Klebsiella pneumoniae",
        aliases: &["K. pneumoniae"],
        tier: Tier::First,
        agent: "Ceftriaxone",
        class: "cephalosporins",
        route: "IV",
        dose_duration: "1 g,IV,daily,7 days",
        renal_adjustment: None,
        considerations: None,
    },
    TherapyRef {
        pathogen: "Klebsiella pneumoniae",
        aliases: &["K. pneumoniae"],
        tier: Tier::Second,
        agent: "Ciprofloxacin",
        class: "fluoroquinolones",
        route: "oral",
        dose_duration: "500 mg,oral,BID,7 days",
        renal_adjustment: Some("reduce dose if CrCl < 30 mL/min"),
        considerations: Some("avoid as first line in uncomplicated cystitis"),
    },
    TherapyRef {
        pathogen: "Klebsiella pneumoniae",
        aliases: &["K. pneumoniae"],
        tier: Tier::Alternative,
        agent: "Meropenem",
        class: "carbapenems",
        route: "IV",
        dose_duration: "1 g,IV,q8h,null",
        renal_adjustment: Some("adjust if CrCl < 50 mL/min"),
        considerations: Some("reserve for ESBL-producing isolates"),
    },
    // Pseudomonas aeruginosa
    TherapyRef {
        pathogen: "Pseudomonas aeruginosa",
        aliases: &["P. aeruginosa"],
        tier: Tier::First,
        agent: "Piperacillin-tazobactam",
        class: "penicillins",
        route: "IV",
        dose_duration: "4.5 g,IV,q6h,null",
        renal_adjustment: Some("extend interval if CrCl < 40 mL/min"),
        considerations: None,
    },
    TherapyRef {
        pathogen: "Pseudomonas aeruginosa",
        aliases: &["P. aeruginosa"],
        tier: Tier::Second,
        agent: "Cefepime",
        class: "cephalosporins",
        route: "IV",
        dose_duration: "2 g,IV,q8h,null",
        renal_adjustment: Some("adjust if CrCl < 60 mL/min"),
        considerations: None,
    },
    TherapyRef {
        pathogen: "Pseudomonas aeruginosa",
        aliases: &["P. aeruginosa"],
        tier: Tier::Alternative,
        agent: "Ciprofloxacin",
        class: "fluoroquinolones",
        route: "oral",
        dose_duration: "750 mg,oral,BID,null",
        renal_adjustment: Some("reduce dose if CrCl < 30 mL/min"),
        considerations: Some("only oral anti-pseudomonal option"),
    },
    // Enterococcus faecalis
    TherapyRef {
        pathogen: "Enterococcus faecalis",
        aliases: &["E. faecalis"],
        tier: Tier::First,
        agent: "Ampicillin",
        class: "penicillins",
        route: "IV",
        dose_duration: "2 g,IV,q4h,null",
        renal_adjustment: Some("extend interval if CrCl < 50 mL/min"),
        considerations: None,
    },
    TherapyRef {
        pathogen: "Enterococcus faecalis",
        aliases: &["E. faecalis"],
        tier: Tier::Second,
        agent: "Vancomycin",
        class: "glycopeptides",
        route: "IV",
        dose_duration: "15-20 mg/kg,IV,q8-12h,null",
        renal_adjustment: Some("dose by trough levels"),
        considerations: None,
    },
    TherapyRef {
        pathogen: "Enterococcus faecalis",
        aliases: &["E. faecalis"],
        tier: Tier::Alternative,
        agent: "Linezolid",
        class: "oxazolidinones",
        route: "oral",
        dose_duration: "600 mg,oral,BID,null",
        renal_adjustment: None,
        considerations: Some("for vanA-positive isolates"),
    },
];

pub const GENES: &[GeneRef] = &[
    GeneRef {
        gene: "mecA",
        class_affected: "beta-lactams",
        considerations: "methicillin resistance; prefer glycopeptide or oxazolidinone coverage",
    },
    GeneRef {
        gene: "vanA",
        class_affected: "glycopeptides",
        considerations: "vancomycin resistance; linezolid or daptomycin preferred",
    },
    GeneRef {
        gene: "CTX-M",
        class_affected: "cephalosporins",
        considerations: "extended-spectrum beta-lactamase; carbapenem coverage for systemic disease",
    },
    GeneRef {
        gene: "KPC",
        class_affected: "carbapenems",
        considerations: "carbapenemase producer; infectious disease consult recommended",
    },
    GeneRef {
        gene: "NDM-1",
        class_affected: "carbapenems",
        considerations: "metallo-beta-lactamase; avoid all beta-lactams except aztreonam combinations",
    },
    GeneRef {
        gene: "ermB",
        class_affected: "macrolides",
        considerations: "inducible macrolide-lincosamide resistance; D-test before clindamycin",
    },
    GeneRef {
        gene: "aac(6')-Ib",
        class_affected: "aminoglycosides",
        considerations: "aminoglycoside-modifying enzyme; verify amikacin susceptibility",
    },
];

pub const ICD_CODES: &[IcdRef] = &[
    IcdRef { code: "A41.9", name: "Sepsis, unspecified organism" },
    IcdRef { code: "J18.9", name: "Pneumonia, unspecified organism" },
    IcdRef { code: "N39.0", name: "Urinary tract infection, site not specified" },
    IcdRef { code: "N10", name: "Acute pyelonephritis" },
    IcdRef { code: "L03.90", name: "Cellulitis, unspecified" },
    IcdRef { code: "K81.0", name: "Acute cholecystitis" },
    IcdRef { code: "G00.9", name: "Bacterial meningitis, unspecified" },
    IcdRef { code: "I33.0", name: "Acute and subacute infective endocarditis" },
];

/// Therapy rows matching an organism name or alias, case-insensitively.
pub fn therapies_for(pathogen: &str) -> Vec<&'static TherapyRef> {
    let wanted = pathogen.trim();
    THERAPIES
        .iter()
        .filter(|row| {
            row.pathogen.eq_ignore_ascii_case(wanted)
                || row.aliases.iter().any(|a| a.eq_ignore_ascii_case(wanted))
        })
        .collect()
}

/// Commentary row for a resistance gene, case-insensitively.
pub fn gene_ref(gene: &str) -> Option<&'static GeneRef> {
    GENES.iter().find(|g| g.gene.eq_ignore_ascii_case(gene.trim()))
}

/// Diagnosis name for an ICD-10 code.
pub fn icd_name(code: &str) -> Option<&'static str> {
    ICD_CODES
        .iter()
        .find(|c| c.code.eq_ignore_ascii_case(code.trim()))
        .map(|c| c.name)
}

//! Prompt templates for the three generation tiers.
//!
//! Every template asks for French-only answers, forbids invented facts and requires
//! "non mentionné" for missing values. The structured-field block uses the keys of
//! [`STRUCTURED_FIELDS`] so [`crate::processing::fields`] can parse the answers back.

/// Placeholder the model must use for missing information.
pub const NOT_MENTIONED: &str = "non mentionné";

/// Structured fields requested from the model, as `(key, label)` pairs.
pub const STRUCTURED_FIELDS: &[(&str, &str)] = &[
    ("intitule_operation", "Intitulé de l'opération"),
    ("intitule_lot", "Intitulé du lot"),
    ("maitre_ouvrage", "Maître d'ouvrage"),
    ("adresse_chantier", "Adresse du chantier"),
    ("maitre_oeuvre", "Maître d'œuvre"),
    ("type_marche_procedure", "Type de marché / procédure"),
    ("date_limite_remise_offres", "Date limite de remise des offres"),
    ("duree_delai_execution", "Durée / délai d'exécution"),
    ("visite_obligatoire", "Visite obligatoire"),
    ("contact_referent", "Contact / référent"),
    ("montant_estime_budget", "Montant estimé / budget"),
    ("variantes_pse", "Variantes / PSE"),
    ("criteres_attribution", "Critères d'attribution"),
];

/// Heading of the structured-field section in every answer.
pub const FIELDS_HEADING: &str = "## Champs structurés";

/// Numbered sections of the final synthesis.
pub const FINAL_SECTIONS: &[&str] = &[
    "## 1. Checklist mémoire technique",
    "## 2. Exigences administratives (RC / CCAP)",
    "## 3. Exigences techniques (CCTP)",
    "## 4. Notation et critères d'attribution",
    "## 5. Points de vigilance et risques",
    "## 6. Pièces et livrables à fournir",
    "## 7. Dates importantes",
];

fn shared_rules() -> String {
    format!(
        "Règles impératives :
- Réponds uniquement en français.
- N'invente rien : utilise seulement ce qui figure dans le texte fourni.
- Si une information est absente, écris exactement « {NOT_MENTIONED} ».
- Reste factuel et concis ; cite les pondérations, montants et dates tels qu'écrits."
    )
}

/// Input of [`chunk_extraction_prompt`].
#[derive(Debug, Clone, Copy)]
pub struct ChunkPrompt<'a> {
    /// File name of the source document.
    pub document: &'a str,
    /// 1-based position of the chunk.
    pub index: usize,
    /// Number of chunks sent for the document.
    pub total: usize,
    /// Chunk text.
    pub text: &'a str,
}

/// Input of [`document_synthesis_prompt`].
#[derive(Debug, Clone, Copy)]
pub struct DocumentPrompt<'a> {
    /// File name of the source document.
    pub document: &'a str,
    /// Per-chunk extractions, in chunk order.
    pub extractions: &'a [String],
}

/// Input of [`final_synthesis_prompt`].
#[derive(Debug, Clone, Copy)]
pub struct FinalPrompt<'a> {
    /// `"Document: <name>\n<summary>"` blocks, one per document that produced text.
    pub summaries: &'a [String],
}

/// Per-chunk extraction: bullet sections plus the structured-field block.
pub fn chunk_extraction_prompt(input: &ChunkPrompt<'_>) -> String {
    format!(
        "Tu es un assistant qui prépare la réponse d'une entreprise du BTP à un appel d'offres.
Voici l'extrait {index}/{total} du document « {document} » du dossier de consultation (DCE).

{rules}

Réponds avec les sections suivantes, en listes à puces :
### Exigences administratives
### Exigences techniques
### Délais et dates
### Risques et points de vigilance
{fields_heading}
{fields}

Extrait :
\"\"\"
{text}
\"\"\"",
        index = input.index,
        total = input.total,
        document = input.document,
        rules = shared_rules(),
        fields_heading = FIELDS_HEADING,
        fields = field_template(),
        text = input.text,
    )
}

/// Per-document synthesis: merge chunk extractions, removing duplicates.
pub fn document_synthesis_prompt(input: &DocumentPrompt<'_>) -> String {
    let extractions = input
        .extractions
        .iter()
        .enumerate()
        .map(|(index, extraction)| {
            format!("--- Extraction {} ---\n{}", index + 1, extraction.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Tu es un assistant qui prépare la réponse d'une entreprise du BTP à un appel d'offres.
Les extractions ci-dessous proviennent de plusieurs passages du document « {document} ».
Fusionne-les en une seule synthèse sans doublons. Lorsqu'un champ est renseigné dans une
extraction et « {not_mentioned} » dans une autre, garde la valeur renseignée.

{rules}

Réponds avec les sections suivantes, en listes à puces :
### Exigences administratives
### Exigences techniques
### Délais et dates
### Risques et points de vigilance
{fields_heading}
{fields}

Extractions :
{extractions}",
        document = input.document,
        not_mentioned = NOT_MENTIONED,
        rules = shared_rules(),
        fields_heading = FIELDS_HEADING,
        fields = field_template(),
    )
}

/// Final cross-document synthesis in Markdown with numbered headings.
pub fn final_synthesis_prompt(input: &FinalPrompt<'_>) -> String {
    format!(
        "Tu es un assistant qui prépare le mémoire technique d'une entreprise du BTP.
Voici les synthèses de chaque pièce du dossier de consultation (RC, CCAP, CCTP, ...).
Rédige une synthèse globale en Markdown. Les critères d'attribution doivent inclure les
pondérations lorsqu'elles existent (ex. : Prix 40 % / Valeur technique 60 %). Les dates
importantes prennent la forme « JJ/MM/AAAA - événement ».

{rules}

Structure obligatoire :
{fields_heading}
{fields}
{sections}

Synthèses par document :
{summaries}",
        rules = shared_rules(),
        fields_heading = FIELDS_HEADING,
        fields = field_template(),
        sections = FINAL_SECTIONS.join("\n"),
        summaries = input.summaries.join("\n\n"),
    )
}

fn field_template() -> String {
    STRUCTURED_FIELDS
        .iter()
        .map(|(key, _)| format!("- **{key}** : …"))
        .collect::<Vec<_>>()
        .join("\n")
}

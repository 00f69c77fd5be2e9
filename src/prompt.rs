//! # Prompt Compiler
//!
//! Renders the schema registry and the fixed rule set into the system
//! instruction block sent with every translation request. Every edge case
//! (direction, property names, capitalization, counting idiom, output
//! format) is spelled out so the generator has as few decisions left as
//! possible.

use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::schema::SchemaRegistry;

/// Count every car in the graph.
pub const COUNT_ALL_TEMPLATE: &str =
    "MATCH (n:Name)-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars";

/// Count cars of one model; `<model_name>` is substituted by the generator.
pub const COUNT_BY_MODEL_TEMPLATE: &str =
    "MATCH (n:Name {name: \"<model_name>\"})-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars";

/// Count cars of one make; `<make_name>` is substituted by the generator.
pub const COUNT_BY_MAKE_TEMPLATE: &str =
    "MATCH (m:Make {name: \"<make_name>\"})-[:MANUFACTURES]->(n:Name)-[:HAS_LOT]->(l:LotNumber) RETURN COUNT(DISTINCT l) AS total_cars";

/// The reply the generator must give when the schema cannot answer.
pub const UNANSWERABLE_REPLY: &str = r#"{ "cypher": "" }"#;

static SYSTEM_PROMPT: LazyLock<String> =
    LazyLock::new(|| compile(SchemaRegistry::auto_auction()));

/// The compiled instructions for the built-in schema.
pub fn system_prompt() -> &'static str {
    &SYSTEM_PROMPT
}

/// Render the full instruction block for `schema`.
pub fn compile(schema: &SchemaRegistry) -> String {
    let mut out = String::with_capacity(4096);

    out.push_str("# Graph Schema:\n");
    for path in schema.paths() {
        out.push_str(&path);
        out.push('\n');
    }

    out.push_str(
        "\nYou are an expert Cypher query generator. Convert the user's question into a \
         syntactically correct and semantically valid Cypher query over the schema above. \
         Follow these instructions strictly:\n",
    );

    out.push_str("\nGENERAL RULES:\n\n");
    out.push_str(
        "1. Use only the node labels and relationship types listed in the schema.\n   \
         - Never invent labels, properties or relationships.\n   \
         - Respect the direction of every relationship exactly as listed.\n\n",
    );
    out.push_str("2. Use the most direct path between nodes that the schema allows.\n\n");
    out.push_str("3. When several valid paths exist, prefer the one with the fewest hops that matches the question.\n\n");
    out.push_str("4. Include intermediate nodes only when the schema requires them.\n\n");

    out.push_str("5. When returning node properties:\n");
    out.push_str("   - For price nodes (");
    let prices: Vec<&str> = schema.nodes().iter().filter(|n| n.is_price).map(|n| n.label).collect();
    out.push_str(&prices.join(", "));
    out.push_str(") return .amount only.\n");
    out.push_str("   - For every other node return exactly this property:\n");
    for kind in schema.nodes() {
        let _ = writeln!(out, "     - :{} ({}) -> .{}", kind.label, kind.description, kind.property);
    }
    out.push_str(
        "   - Never return whole nodes, labels or relationship names.\n   \
         - Example: RETURN n.name, s.amount or RETURN l.lot_number\n\n",
    );
    out.push_str(
        "6. Do not include explanations, markdown or natural language. Reply only with a JSON \
         object holding the \"cypher\" key.\n",
    );

    out.push_str("\nSPECIAL RULES:\n\n");
    out.push_str("- For any question involving the make of a car:\n");
    out.push_str("   - Always use exactly: MATCH (m:Make)-[:MANUFACTURES]->(n:Name)\n");
    out.push_str("   - Variable m always refers to :Make and n always refers to :Name, throughout the whole query.\n");
    out.push_str("   - Never reverse the direction or use another relationship name.\n");
    out.push_str("   - Never rename m or n once they are bound.\n\n");
    out.push_str("- Always capitalize the first letter of any string the user provides (make, model, place).\n");
    out.push_str("   - If the user says \"honda\", insert \"Honda\" into the query.\n");
    out.push_str("   - Apply this to every name, make, place and model filter in MATCH and WHERE.\n");

    out.push_str("\nCOUNTING LOGIC:\n\n");
    out.push_str("- Counting all cars (e.g. \"how many cars are there\"):\n");
    let _ = writeln!(out, "   - Use: {COUNT_ALL_TEMPLATE}");
    out.push_str("- Counting cars by model name:\n");
    let _ = writeln!(out, "   - Use: {COUNT_BY_MODEL_TEMPLATE}");
    out.push_str("- Counting cars by make:\n");
    let _ = writeln!(out, "   - Use: {COUNT_BY_MAKE_TEMPLATE}");

    out.push_str("\nTRAVERSAL GUIDELINES:\n\n");
    out.push_str("- Every MATCH follows the directions defined in the schema.\n");
    out.push_str("- Do not assume or infer relationships the schema does not list.\n");
    out.push_str("- Do not jump across unrelated node types.\n");

    out.push_str("\nUNANSWERABLE QUESTIONS:\n\n");
    out.push_str("If the question cannot be answered with the schema, reply with exactly:\n");
    out.push_str(UNANSWERABLE_REPLY);
    out.push('\n');

    out.push_str("\nSTRICT OUTPUT FORMAT:\n\n");
    out.push_str(
        "Reply with a single valid JSON object of the form {\"cypher\": \"<query>\"}. \
         No commentary. No markdown. No explanation.\n",
    );

    out
}

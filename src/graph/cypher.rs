//! Cypher statement builders.
//!
//! Pure functions from schema names to parameterized statements; the bolt
//! backend runs them verbatim. Property values always travel as parameters,
//! never inlined.

use super::{CREATED, UPDATED};

/// Parameter name carrying the parent id in edge statements.
pub const PARENT_ID_PARAM: &str = "__parent_id__";

fn set_fragments(target: &str, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| format!("{target}.{k} = ${k}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// MERGE a node by id, stamping `created` on first write and `updated` on
/// re-match, with every own property set in both branches.
pub fn upsert_node(kind: &str, id_field: &str, prop_keys: &[&str]) -> String {
    let props = set_fragments("n", prop_keys);
    let mut statement = format!("MERGE (n:{kind} {{ {id_field}: ${id_field} }})");
    statement.push_str(&format!(" ON CREATE SET n.{CREATED} = datetime()"));
    if !props.is_empty() {
        statement.push_str(&format!(", {props}"));
    }
    statement.push_str(&format!(" ON MATCH SET n.{UPDATED} = datetime()"));
    if !props.is_empty() {
        statement.push_str(&format!(", {props}"));
    }
    statement
}

/// CREATE a node with the given properties (insert-only mode).
pub fn new_node(kind: &str, prop_keys: &[&str]) -> String {
    let props = prop_keys
        .iter()
        .map(|k| format!("{k}: ${k}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE (:{kind} {{ {props} }})")
}

/// Count nodes with the given identity.
pub fn node_exists(kind: &str, id_field: &str) -> String {
    format!("MATCH (m:{kind} {{ {id_field}: ${id_field} }}) RETURN count(m) AS c")
}

/// Detach-delete one node by identity.
pub fn detach_delete(kind: &str, id_field: &str) -> String {
    format!("MATCH (n:{kind} {{ {id_field}: ${id_field} }}) DETACH DELETE n")
}

/// Children of a node whose every outgoing parent edge targets that node.
pub fn children_with_single_parent(kind: &str, id_field: &str) -> String {
    format!(
        "MATCH (n:{kind} {{ {id_field}: ${id_field} }})<--(m) \
         WHERE NOT EXISTS {{ MATCH (m)-->(x) WHERE x <> n }} RETURN m"
    )
}

/// Id of the parent currently linked from a child over a label.
pub fn linked_parent(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
    parent_id_field: &str,
) -> String {
    format!(
        "MATCH (n:{child_kind} {{ {child_id_field}: ${child_id_field} }})\
         -[r:{label}]->(m:{parent_kind}) RETURN m.{parent_id_field} AS parent_id"
    )
}

/// Delete the edge of a label from a child to any node of the parent kind.
pub fn delete_linked_edge(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
) -> String {
    format!(
        "MATCH (n:{child_kind} {{ {child_id_field}: ${child_id_field} }})\
         -[r:{label}]->(m:{parent_kind}) DELETE r"
    )
}

/// Count other children already linked to a parent over a label.
pub fn parent_has_other_child(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
    parent_id_field: &str,
) -> String {
    format!(
        "MATCH (n:{child_kind})-[r:{label}]->\
         (m:{parent_kind} {{ {parent_id_field}: ${PARENT_ID_PARAM} }}) \
         WHERE n.{child_id_field} <> ${child_id_field} RETURN count(n) AS c"
    )
}

/// MERGE an edge from child to parent with timestamp semantics and the given
/// edge properties set in both branches.
pub fn merge_edge(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
    parent_id_field: &str,
    prop_keys: &[&str],
) -> String {
    let props = set_fragments("r", prop_keys);
    let mut statement = format!(
        "MATCH (m:{parent_kind} {{ {parent_id_field}: ${PARENT_ID_PARAM} }}) \
         MATCH (n:{child_kind} {{ {child_id_field}: ${child_id_field} }}) \
         MERGE (n)-[r:{label}]->(m)"
    );
    statement.push_str(&format!(" ON CREATE SET r.{CREATED} = datetime()"));
    if !props.is_empty() {
        statement.push_str(&format!(", {props}"));
    }
    statement.push_str(&format!(" ON MATCH SET r.{UPDATED} = datetime()"));
    if !props.is_empty() {
        statement.push_str(&format!(", {props}"));
    }
    statement
}

/// Count the edges of a label from a child to any node of the parent kind.
pub fn count_linked_edges(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
) -> String {
    format!(
        "MATCH (n:{child_kind} {{ {child_id_field}: ${child_id_field} }})-[r:{label}]->\
         (m:{parent_kind}) RETURN count(r) AS c"
    )
}

/// Count the exact edge the merge statement would match.
pub fn edge_exists(
    child_kind: &str,
    child_id_field: &str,
    label: &str,
    parent_kind: &str,
    parent_id_field: &str,
) -> String {
    format!(
        "MATCH (n:{child_kind} {{ {child_id_field}: ${child_id_field} }})-[r:{label}]->\
         (m:{parent_kind} {{ {parent_id_field}: ${PARENT_ID_PARAM} }}) RETURN count(r) AS c"
    )
}

/// Count all nodes.
pub fn count_nodes() -> String {
    "MATCH (n) RETURN count(n) AS c".to_string()
}

/// Count all relationships.
pub fn count_relationships() -> String {
    "MATCH ()-[r]->() RETURN count(r) AS c".to_string()
}

/// Count the edges touching one node.
pub fn count_node_edges(kind: &str, id_field: &str) -> String {
    format!("MATCH (n:{kind} {{ {id_field}: ${id_field} }})-[r]-() RETURN count(r) AS c")
}

/// Detach-delete the whole graph.
pub fn wipe() -> String {
    "MATCH (n) DETACH DELETE n".to_string()
}

/// Detach-delete at most `limit` nodes.
pub fn wipe_batch(limit: usize) -> String {
    format!("MATCH (n) WITH n LIMIT {limit} DETACH DELETE n")
}

/// List all indexes.
pub fn show_indexes() -> String {
    "SHOW INDEXES".to_string()
}

/// Create a BTREE index on a label and property list.
pub fn create_index(kind: &str, props: &[String]) -> String {
    let columns = props
        .iter()
        .map(|p| format!("n.{p}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE BTREE INDEX IF NOT EXISTS FOR (n:{kind}) ON ({columns})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_node() {
        let statement = upsert_node("case", "case_id", &["breed", "uuid"]);
        assert_eq!(
            statement,
            "MERGE (n:case { case_id: $case_id }) \
             ON CREATE SET n.created = datetime(), n.breed = $breed, n.uuid = $uuid \
             ON MATCH SET n.updated = datetime(), n.breed = $breed, n.uuid = $uuid"
        );
    }

    #[test]
    fn test_upsert_node_without_props() {
        let statement = upsert_node("case", "case_id", &[]);
        assert_eq!(
            statement,
            "MERGE (n:case { case_id: $case_id }) \
             ON CREATE SET n.created = datetime() \
             ON MATCH SET n.updated = datetime()"
        );
    }

    #[test]
    fn test_new_node() {
        assert_eq!(
            new_node("case", &["case_id", "breed"]),
            "CREATE (:case { case_id: $case_id, breed: $breed })"
        );
    }

    #[test]
    fn test_edge_statements() {
        assert_eq!(
            merge_edge("sample", "sample_id", "of_case", "case", "case_id", &[]),
            "MATCH (m:case { case_id: $__parent_id__ }) \
             MATCH (n:sample { sample_id: $sample_id }) \
             MERGE (n)-[r:of_case]->(m) \
             ON CREATE SET r.created = datetime() \
             ON MATCH SET r.updated = datetime()"
        );
        assert_eq!(
            linked_parent("sample", "sample_id", "of_case", "case", "case_id"),
            "MATCH (n:sample { sample_id: $sample_id })-[r:of_case]->(m:case) \
             RETURN m.case_id AS parent_id"
        );
        assert_eq!(
            delete_linked_edge("sample", "sample_id", "of_case", "case"),
            "MATCH (n:sample { sample_id: $sample_id })-[r:of_case]->(m:case) DELETE r"
        );
    }

    #[test]
    fn test_maintenance_statements() {
        assert_eq!(wipe(), "MATCH (n) DETACH DELETE n");
        assert_eq!(wipe_batch(1000), "MATCH (n) WITH n LIMIT 1000 DETACH DELETE n");
        assert_eq!(
            create_index("case", &["case_id".to_string()]),
            "CREATE BTREE INDEX IF NOT EXISTS FOR (n:case) ON (n.case_id)"
        );
        assert_eq!(
            node_exists("case", "case_id"),
            "MATCH (m:case { case_id: $case_id }) RETURN count(m) AS c"
        );
    }
}

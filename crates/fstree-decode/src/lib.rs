//! Typed decoders for the two FamilySearch Tree API response shapes.
//!
//! These are pure functions: they turn a `serde_json::Value` into typed
//! facts but never touch a store. Callers (the BFS/Resolution engines)
//! decide how to fold the decoded facts into storage operations.

use fstree_error::Result;
use fstree_types::{Color, FsId, RelationshipType};
use serde_json::Value;
use tracing::warn;

/// One resolved individual, ready for `Store::add_individual`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPerson {
    pub id: FsId,
    pub color: Color,
    pub surname: Option<String>,
    pub given_name: Option<String>,
    pub lifespan: Option<String>,
}

/// One discovered parent-child link, ready for
/// `Store::add_parent_child_relationship`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentChildLink {
    pub child: FsId,
    pub parent: FsId,
    pub rel_id: FsId,
}

/// The decoded contents of a `/platform/tree/persons/.json` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonsResult {
    pub persons: Vec<DecodedPerson>,
    /// Couple endpoints discovered via `relationships[].type == Couple`.
    /// These only enqueue frontier entries; no edge is recorded for them.
    pub couple_endpoints: Vec<FsId>,
    pub parent_child_links: Vec<ParentChildLink>,
}

/// One resolved relationship fact, ready for `Store::update_relationship`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRelationship {
    pub child: FsId,
    pub parent: FsId,
    pub rel_type: RelationshipType,
}

/// The decoded contents of a
/// `/platform/tree/child-and-parents-relationships/{id}.json` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipResult {
    pub resolved: Vec<ResolvedRelationship>,
}

/// Unwraps a nested `{"error": {...}}` envelope, returning the inner
/// payload when it carries one. Returns `None` when `data` is itself the
/// opaque error marker the HTTP session produces for the cases that never
/// carry a JSON body.
pub fn check_error(data: &Value) -> Option<&Value> {
    match data.get("error") {
        Some(inner) if inner.is_object() => Some(inner),
        Some(_) => None,
        None => Some(data),
    }
}

fn resource_id(entry: &Value, key: &str) -> Option<FsId> {
    let raw = entry.get(key)?.get("resourceId")?.as_str()?;
    FsId::new(raw).ok()
}

/// Implements spec §4.4 `process_persons_result`.
pub fn decode_persons_result(data: &Value) -> Result<PersonsResult> {
    let Some(data) = check_error(data) else {
        return Ok(PersonsResult::default());
    };
    let mut result = PersonsResult::default();

    if let Some(persons) = data.get("persons").and_then(Value::as_array) {
        for person in persons {
            match decode_person(person) {
                Some(p) => result.persons.push(p),
                None => warn!(?person, "skipping person with no usable id"),
            }
        }
    }

    if let Some(relationships) = data.get("relationships").and_then(Value::as_array) {
        for relationship in relationships {
            if relationship.get("type").and_then(Value::as_str) != Some("http://gedcomx.org/Couple") {
                continue;
            }
            if let Some(p1) = resource_id(relationship, "person1") {
                result.couple_endpoints.push(p1);
            }
            if let Some(p2) = resource_id(relationship, "person2") {
                result.couple_endpoints.push(p2);
            }
        }
    }

    if let Some(rels) = data.get("childAndParentsRelationships").and_then(Value::as_array) {
        for rel in rels {
            let Some(rel_id) = rel.get("id").and_then(Value::as_str).and_then(|s| FsId::new(s).ok())
            else {
                warn!(?rel, "childAndParentsRelationships entry missing id");
                continue;
            };
            let Some(child) = resource_id(rel, "child") else {
                warn!(rel_id = %rel_id, "childAndParentsRelationships entry missing child");
                continue;
            };
            for key in ["parent1", "parent2"] {
                match resource_id(rel, key) {
                    Some(parent) => result.parent_child_links.push(ParentChildLink {
                        child: child.clone(),
                        parent,
                        rel_id: rel_id.clone(),
                    }),
                    None => {
                        if rel.get(key).is_some() {
                            warn!(rel_id = %rel_id, side = key, "missing parent resourceId");
                        }
                    }
                }
            }
        }
    }

    Ok(result)
}

fn decode_person(person: &Value) -> Option<DecodedPerson> {
    let id = person.get("id").and_then(Value::as_str).and_then(|s| FsId::new(s).ok())?;
    let gender_uri = person
        .get("gender")
        .and_then(|g| g.get("type"))
        .and_then(Value::as_str);
    let color = Color::from_gender_uri(gender_uri);
    let (surname, given_name) = preferred_name(person);
    let lifespan = person
        .get("display")
        .and_then(|d| d.get("lifespan"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    Some(DecodedPerson {
        id,
        color,
        surname,
        given_name,
        lifespan,
    })
}

fn preferred_name(person: &Value) -> (Option<String>, Option<String>) {
    let Some(names) = person.get("names").and_then(Value::as_array) else {
        return (None, None);
    };
    let preferred = names
        .iter()
        .find(|n| n.get("preferred").and_then(Value::as_bool) == Some(true))
        .or_else(|| names.first());
    let Some(name_form) = preferred.and_then(|n| n.get("nameForms")).and_then(|f| f.get(0)) else {
        return (None, None);
    };
    let mut surname = None;
    let mut given_name = None;
    if let Some(parts) = name_form.get("parts").and_then(Value::as_array) {
        for part in parts {
            let value = part.get("value").and_then(Value::as_str).map(str::to_owned);
            match part.get("type").and_then(Value::as_str) {
                Some("http://gedcomx.org/Surname") => surname = value,
                Some("http://gedcomx.org/Given") => given_name = value,
                _ => {}
            }
        }
    }
    (surname, given_name)
}

/// Implements spec §4.4 `process_relationship_result`.
pub fn decode_relationship_result(data: &Value) -> Result<RelationshipResult> {
    let Some(data) = check_error(data) else {
        return Ok(RelationshipResult::default());
    };
    let mut result = RelationshipResult::default();
    let Some(rels) = data.get("childAndParentsRelationships").and_then(Value::as_array) else {
        return Ok(result);
    };
    for rel in rels {
        let Some(child) = resource_id(rel, "child") else {
            continue;
        };
        for (parent_key, facts_key) in [("parent1", "parent1Facts"), ("parent2", "parent2Facts")] {
            let Some(parent) = resource_id(rel, parent_key) else {
                continue;
            };
            let rel_type = relationship_type_from_facts(rel, facts_key, rel.get("id").and_then(Value::as_str));
            result.resolved.push(ResolvedRelationship {
                child: child.clone(),
                parent,
                rel_type,
            });
        }
    }
    Ok(result)
}

fn relationship_type_from_facts(rel: &Value, facts_key: &str, rel_id: Option<&str>) -> RelationshipType {
    let mut resolved = RelationshipType::UnspecifiedParentType;
    if let Some(facts) = rel.get(facts_key).and_then(Value::as_array) {
        for fact in facts {
            let Some(uri) = fact.get("type").and_then(Value::as_str) else {
                continue;
            };
            let Some(new_type) = RelationshipType::from_fact_type_uri(uri) else {
                warn!(uri, "unrecognized relationship fact type");
                continue;
            };
            if resolved != RelationshipType::UnspecifiedParentType && resolved != new_type {
                tracing::debug!(
                    rel_id,
                    facts_key,
                    old = %resolved,
                    new = %new_type,
                    "replacing fact with a later one for the same side"
                );
            }
            resolved = new_type;
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn check_error_unwraps_nested_payload() {
        let data = json!({"error": {"persons": []}});
        assert_eq!(check_error(&data), Some(&json!({"persons": []})));
    }

    #[test]
    fn check_error_passes_through_error_free_payloads() {
        let data = json!({"persons": []});
        assert_eq!(check_error(&data), Some(&data));
    }

    #[test]
    fn check_error_drops_opaque_error_markers() {
        let data = json!({"error": "not found"});
        assert_eq!(check_error(&data), None);
    }

    #[test]
    fn decodes_persons_and_parent_child_links() {
        let data = json!({
            "persons": [{
                "id": "ABCD-EFG",
                "gender": {"type": "http://gedcomx.org/Male"},
                "names": [{"preferred": true, "nameForms": [{"parts": [
                    {"type": "http://gedcomx.org/Given", "value": "John"},
                    {"type": "http://gedcomx.org/Surname", "value": "Doe"}
                ]}]}],
                "display": {"lifespan": "1900-1950"}
            }],
            "relationships": [{
                "type": "http://gedcomx.org/Couple",
                "person1": {"resourceId": "AAAA-111"},
                "person2": {"resourceId": "BBBB-222"}
            }],
            "childAndParentsRelationships": [{
                "id": "CCCC-333",
                "child": {"resourceId": "ABCD-EFG"},
                "parent1": {"resourceId": "AAAA-111"}
            }]
        });
        let result = decode_persons_result(&data).unwrap();
        assert_eq!(result.persons.len(), 1);
        assert_eq!(result.persons[0].color.as_i8(), -1);
        assert_eq!(result.persons[0].surname.as_deref(), Some("Doe"));
        assert_eq!(result.couple_endpoints.len(), 2);
        assert_eq!(result.parent_child_links.len(), 1);
        assert_eq!(result.parent_child_links[0].parent.as_str(), "AAAA-111");
    }

    #[test]
    fn missing_parent_resource_id_is_skipped_not_fatal() {
        let data = json!({
            "persons": [],
            "childAndParentsRelationships": [{
                "id": "CCCC-333",
                "child": {"resourceId": "ABCD-EFG"},
                "parent1": {}
            }]
        });
        let result = decode_persons_result(&data).unwrap();
        assert!(result.parent_child_links.is_empty());
    }

    #[test]
    fn resolves_relationship_facts_preferring_last_seen() {
        let data = json!({
            "childAndParentsRelationships": [{
                "id": "CCCC-333",
                "child": {"resourceId": "ABCD-EFG"},
                "parent1": {"resourceId": "AAAA-111"},
                "parent1Facts": [
                    {"type": "http://gedcomx.org/AdoptiveParent"},
                    {"type": "http://gedcomx.org/StepParent"}
                ]
            }]
        });
        let result = decode_relationship_result(&data).unwrap();
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.resolved[0].rel_type, RelationshipType::StepParent);
    }

    #[test]
    fn defaults_to_unspecified_when_no_facts_present() {
        let data = json!({
            "childAndParentsRelationships": [{
                "id": "CCCC-333",
                "child": {"resourceId": "ABCD-EFG"},
                "parent1": {"resourceId": "AAAA-111"}
            }]
        });
        let result = decode_relationship_result(&data).unwrap();
        assert_eq!(result.resolved[0].rel_type, RelationshipType::UnspecifiedParentType);
    }
}

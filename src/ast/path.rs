use apollo_compiler::ast::{Field, FragmentDefinition, Name, Selection};
use apollo_compiler::Node;
use indexmap::IndexMap;

/// One step of a GraphQL response path: either a field's output key or a
/// list index. Only `Field` steps correspond to a selection in the AST;
/// `Index` steps are skipped when resolving back against a selection set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponsePathStep {
    Field(Name),
    Index(usize),
}

/// The alias (or field name, if unaliased) at every field-level step of a
/// response path, in root-to-leaf order. List-index steps are omitted: they
/// don't correspond to a selection, only to a position within one.
pub fn collect_aliases_in_response_path(path: &[ResponsePathStep]) -> Vec<Name> {
    path.iter()
        .filter_map(|step| match step {
            ResponsePathStep::Field(name) => Some(name.clone()),
            ResponsePathStep::Index(_) => None,
        })
        .collect()
}

/// Walks `root_selection_set` one alias at a time, transparently descending
/// through fragment spreads and inline fragments (which don't consume a path
/// level), and returns the chain of `Field` nodes whose output keys produced
/// `aliases`. A path that can't be resolved yields a shorter-than-expected
/// chain; callers treat that as an internal-error condition, since this
/// function only ever retraces a path the executor itself just walked.
pub fn collect_field_nodes_in_path(
    root_selection_set: &[Selection],
    aliases: &[Name],
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
) -> Vec<Node<Field>> {
    let mut chain = Vec::with_capacity(aliases.len());
    let mut current_level: Vec<Selection> = root_selection_set.to_vec();

    for alias in aliases {
        let Some(field) = find_field_by_output_key(&current_level, alias, fragments) else {
            break;
        };
        current_level = field.selection_set.clone();
        chain.push(field);
    }
    chain
}

fn find_field_by_output_key(
    selections: &[Selection],
    alias: &Name,
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
) -> Option<Node<Field>> {
    for selection in selections {
        match selection {
            Selection::Field(field) => {
                let key = field.alias.as_ref().unwrap_or(&field.name);
                if key == alias {
                    return Some(field.clone());
                }
            }
            Selection::InlineFragment(inline) => {
                if let Some(found) =
                    find_field_by_output_key(&inline.selection_set, alias, fragments)
                {
                    return Some(found);
                }
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = fragments.get(&spread.fragment_name) {
                    if let Some(found) =
                        find_field_by_output_key(&fragment.selection_set, alias, fragments)
                    {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

use apollo_compiler::ast::{Argument, Field, FragmentDefinition, Name, Selection, Value};
use apollo_compiler::{Node, NodeStr};
use indexmap::IndexMap;

/// A minimal field node with no arguments and no selection, e.g. the bare
/// `__typename` discriminator the proxy resolver injects.
pub fn create_field_node(name: Name) -> Node<Field> {
    Node::new(Field {
        alias: None,
        name,
        arguments: Vec::new(),
        directives: Default::default(),
        selection_set: Vec::new(),
    })
}

pub struct AddedFieldSelection {
    /// The output key (alias, or the field name if unaliased) under which the
    /// field's value will appear in the upstream response.
    pub alias: Name,
    pub selection_set: Vec<Selection>,
}

/// Output key of a field-like selection: its alias, or its name if unaliased.
fn field_output_key(field: &Field) -> &Name {
    field.alias.as_ref().unwrap_or(&field.name)
}

/// Every output key already present in a selection set, following fragment
/// spreads (via `fragments`) and inline fragments but never descending into
/// nested selection sets.
fn existing_output_keys(selections: &[Selection], fragments: &IndexMap<Name, Node<FragmentDefinition>>) -> Vec<Name> {
    let mut keys = Vec::new();
    let mut stack: Vec<&[Selection]> = vec![selections];
    while let Some(level) = stack.pop() {
        for selection in level {
            match selection {
                Selection::Field(field) => keys.push(field_output_key(field).clone()),
                Selection::InlineFragment(inline) => stack.push(&inline.selection_set),
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        stack.push(&fragment.selection_set);
                    }
                }
            }
        }
    }
    keys
}

/// Finds a non-aliased selection of `field_name` anywhere in `selections`
/// (through fragment spreads and inline fragments), returning its effective
/// output key. If none exists, returns a new selection set with `field_name`
/// appended under a non-colliding alias, plus that alias.
pub fn add_field_selection_safely(
    selections: &[Selection],
    field_name: &str,
    fragments: &IndexMap<Name, Node<FragmentDefinition>>,
) -> AddedFieldSelection {
    let mut stack: Vec<&[Selection]> = vec![selections];
    while let Some(level) = stack.pop() {
        for selection in level {
            match selection {
                Selection::Field(field)
                    if field.alias.is_none() && field.name.as_str() == field_name =>
                {
                    return AddedFieldSelection {
                        alias: field.name.clone(),
                        selection_set: selections.to_vec(),
                    };
                }
                Selection::Field(_) => {}
                Selection::InlineFragment(inline) => stack.push(&inline.selection_set),
                Selection::FragmentSpread(spread) => {
                    if let Some(fragment) = fragments.get(&spread.fragment_name) {
                        stack.push(&fragment.selection_set);
                    }
                }
            }
        }
    }

    let existing_keys = existing_output_keys(selections, fragments);
    let mut candidate = field_name.to_string();
    let mut suffix = 1u32;
    while existing_keys.iter().any(|key| key.as_str() == candidate) {
        suffix += 1;
        candidate = format!("{field_name}{suffix}");
    }
    let alias = Name::new_unchecked(NodeStr::new(&candidate));
    let mut field = create_field_node(Name::new_unchecked(NodeStr::new(field_name)));
    if alias.as_str() != field_name {
        field.make_mut().alias = Some(alias.clone());
    }

    let mut new_selections = selections.to_vec();
    new_selections.push(Selection::Field(field));
    AddedFieldSelection {
        alias,
        selection_set: new_selections,
    }
}

#[allow(dead_code)]
pub(crate) fn scalar_argument(name: Name, value: Value) -> Node<Argument> {
    Node::new(Argument {
        name,
        value: Node::new(value),
    })
}

use serde_json::Value;

/// Pull the "bottom" pagination cursor out of a GraphQL payload,
/// whichever of the known instruction shapes it arrived in: flat
/// add-entries, a pinned/replaced single entry, module-add items or a
/// nested conversation module. None when nothing recognizable is there
pub fn extract_bottom_cursor(data: &Value) -> Option<String> {
    let mut instruction_arrays = Vec::new();
    collect_instruction_arrays(data, &mut instruction_arrays);
    for instructions in instruction_arrays {
        for instruction in instructions.iter() {
            // flat entries, both the current and the legacy key layout
            let entry_lists = [
                &instruction["entries"],
                &instruction["addEntries"]["entries"],
            ];
            for entries in entry_lists.iter() {
                for entry in entries.as_array().into_iter().flatten() {
                    if let Some(cursor) = cursor_from_entry(entry) {
                        return Some(cursor);
                    }
                }
            }
            // pinned / replaced single entry
            let single_entries = [
                &instruction["entry"],
                &instruction["replaceEntry"]["entry"],
            ];
            for entry in single_entries.iter() {
                if let Some(cursor) = cursor_from_entry(entry) {
                    return Some(cursor);
                }
            }
            // module-add
            for item in instruction["moduleItems"].as_array().into_iter().flatten() {
                if let Some(cursor) = cursor_from_item_content(&item["item"]["itemContent"]) {
                    return Some(cursor);
                }
            }
        }
    }
    None
}

/// Instruction arrays live at different depths per operation; collect
/// every `instructions` array in the tree instead of hardcoding paths
pub(crate) fn collect_instruction_arrays<'a>(value: &'a Value, out: &mut Vec<&'a Vec<Value>>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::Array(items) if key == "instructions" => out.push(items),
                    _ => collect_instruction_arrays(child, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_instruction_arrays(item, out);
            }
        }
        _ => {}
    }
}

fn cursor_from_entry(entry: &Value) -> Option<String> {
    let content = &entry["content"];
    // a dedicated cursor entry
    if let Some(cursor) = bottom_cursor_value(content) {
        return Some(cursor);
    }
    // cursor tucked into an item wrapper
    if let Some(cursor) = cursor_from_item_content(&content["itemContent"]) {
        return Some(cursor);
    }
    // nested conversation module: the cursor is one of the module items
    for item in content["items"].as_array().into_iter().flatten() {
        if let Some(cursor) = cursor_from_item_content(&item["item"]["itemContent"]) {
            return Some(cursor);
        }
    }
    // legacy operation wrapper
    bottom_cursor_value(&content["operation"]["cursor"])
}

fn cursor_from_item_content(item_content: &Value) -> Option<String> {
    bottom_cursor_value(item_content)
}

fn bottom_cursor_value(candidate: &Value) -> Option<String> {
    let cursor_type = candidate["cursorType"]
        .as_str()
        .or_else(|| candidate["cursor_type"].as_str())?;
    // "ShowMoreThreads" and "Top" cursors are not pagination
    if cursor_type != "Bottom" {
        return None;
    }
    candidate["value"].as_str().map(|value| value.to_owned())
}

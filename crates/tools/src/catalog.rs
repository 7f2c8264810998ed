//! Function schemas offered to the model.

use serde_json::{json, Value};

pub const MAKE_PLAN: &str = "make_plan";
pub const READ_FILE: &str = "read_file";
pub const GOTO_URL: &str = "goto_url";
pub const LIST_LINKS: &str = "list_links";
pub const LIST_INPUTS: &str = "list_inputs";
pub const CLICK_LINK: &str = "click_link";
pub const TYPE_TEXT: &str = "type_text";
pub const SEND_FORM: &str = "send_form";
pub const GET_CONTENT: &str = "get_content";
pub const ANSWER_USER: &str = "answer_user";

pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSchema {
    /// OpenAI `tools[]` entry.
    pub fn to_function(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters
            }
        })
    }
}

fn reasoning() -> Value {
    json!({
        "type": "string",
        "description": "Explanation on why you would like to run this function."
    })
}

/// Object schema whose properties start with `reasoning`.
fn with_reasoning(extra: Value, required: &[&str]) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("reasoning".to_string(), reasoning());
    if let Value::Object(extra) = extra {
        properties.extend(extra);
    }
    let mut required_list = vec!["reasoning"];
    required_list.extend_from_slice(required);
    json!({
        "type": "object",
        "properties": properties,
        "required": required_list
    })
}

/// Every tool the agent understands, in catalog order.
pub fn all_tools() -> Vec<ToolSchema> {
    vec![
        ToolSchema {
            name: MAKE_PLAN,
            description: "Create a plan to accomplish the given task. Summarize what the user's task is in a step by step manner. How would you browse the internet to accomplish the task?",
            parameters: json!({
                "type": "object",
                "properties": {
                    "plan": {
                        "type": "string",
                        "description": "The step by step plan on how you will navigate the internet and what you will do"
                    }
                },
                "required": ["plan"]
            }),
        },
        ToolSchema {
            name: READ_FILE,
            description: "Read the contents of a file on the user's computer. The user is asked for permission first.",
            parameters: with_reasoning(
                json!({
                    "path": {"type": "string", "description": "Path of the file to read"}
                }),
                &["path"],
            ),
        },
        ToolSchema {
            name: GOTO_URL,
            description: "Goes to a specific URL",
            parameters: with_reasoning(
                json!({
                    "url": {"type": "string", "description": "The URL to go to (including protocol)"}
                }),
                &["url"],
            ),
        },
        ToolSchema {
            name: LIST_LINKS,
            description: "Gets a list of the links on the current page",
            parameters: with_reasoning(json!({}), &[]),
        },
        ToolSchema {
            name: LIST_INPUTS,
            description: "Gets a list of the input fields on the current page",
            parameters: with_reasoning(json!({}), &[]),
        },
        ToolSchema {
            name: CLICK_LINK,
            description: "Clicks a specific link on the page",
            parameters: with_reasoning(
                json!({
                    "link_id": {"type": "number", "description": "The ID number of the link to click"}
                }),
                &["link_id"],
            ),
        },
        ToolSchema {
            name: TYPE_TEXT,
            description: "Types text into input fields. Pass input_id and text for one field, or inputs for several. Set submit to send the form afterwards.",
            parameters: with_reasoning(
                json!({
                    "input_id": {"type": "number", "description": "The ID number of the input to type into"},
                    "text": {"type": "string", "description": "The text to type"},
                    "inputs": {
                        "type": "array",
                        "description": "Several fields to fill in order",
                        "items": {
                            "type": "object",
                            "properties": {
                                "input_id": {"type": "number"},
                                "text": {"type": "string"}
                            },
                            "required": ["input_id", "text"]
                        }
                    },
                    "submit": {"type": "boolean", "description": "Send the form after typing"}
                }),
                &[],
            ),
        },
        ToolSchema {
            name: SEND_FORM,
            description: "Sends the form that the last filled input field belongs to",
            parameters: with_reasoning(json!({}), &[]),
        },
        ToolSchema {
            name: GET_CONTENT,
            description: "Gets the text content on the current page",
            parameters: with_reasoning(json!({}), &[]),
        },
        ToolSchema {
            name: ANSWER_USER,
            description: "Give an answer to the user and end the navigation. Use when the given task has been completed.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "answer": {
                        "type": "string",
                        "description": "The response to the user"
                    }
                },
                "required": ["answer"]
            }),
        },
    ]
}

pub fn all_schemas() -> Vec<Value> {
    all_tools().iter().map(ToolSchema::to_function).collect()
}

/// Schemas for the named tools only, in catalog order.
pub fn schemas(names: &[&str]) -> Vec<Value> {
    all_tools()
        .iter()
        .filter(|tool| names.contains(&tool.name))
        .map(ToolSchema::to_function)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schemas_shape() {
        let schemas = all_schemas();
        assert_eq!(schemas.len(), 10);
        for schema in &schemas {
            assert_eq!(schema["type"], "function");
            assert!(schema["function"]["name"].is_string());
            assert!(schema["function"]["description"].is_string());
            assert_eq!(schema["function"]["parameters"]["type"], "object");
        }
    }

    #[test]
    fn test_reasoning_required_first() {
        let schemas = schemas(&[CLICK_LINK]);
        assert_eq!(schemas.len(), 1);
        let required = &schemas[0]["function"]["parameters"]["required"];
        assert_eq!(required, &json!(["reasoning", "link_id"]));
    }

    #[test]
    fn test_filtered_schemas_keep_catalog_order() {
        let names: Vec<Value> = schemas(&[ANSWER_USER, GOTO_URL])
            .iter()
            .map(|s| s["function"]["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("goto_url"), json!("answer_user")]);
        assert!(schemas(&["nonexistent_tool"]).is_empty());
    }
}

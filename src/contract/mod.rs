use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IoType {
    Any,
    String,
    Int,
    Float,
    Image,
    Prompt,
    ExtraPngInfo,
}

impl IoType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Image => "IMAGE",
            Self::Prompt => "PROMPT",
            Self::ExtraPngInfo => "EXTRA_PNGINFO",
        }
    }

    /// Types the host fills in itself rather than through graph links.
    pub fn is_host_injected(self) -> bool {
        matches!(self, Self::Prompt | Self::ExtraPngInfo)
    }
}

impl fmt::Display for IoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IoType {
    type Err = ContractError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "*" => Ok(Self::Any),
            "STRING" => Ok(Self::String),
            "INT" => Ok(Self::Int),
            "FLOAT" => Ok(Self::Float),
            "IMAGE" => Ok(Self::Image),
            "PROMPT" => Ok(Self::Prompt),
            "EXTRA_PNGINFO" => Ok(Self::ExtraPngInfo),
            other => Err(ContractError::UnsupportedIoType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSection {
    Required,
    Optional,
    Hidden,
}

impl InputSection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputOptions {
    pub default: Option<Value>,
    pub tooltip: Option<String>,
    /// Only a link can feed the input; the UI shows no widget for it.
    pub force_input: bool,
}

impl InputOptions {
    pub fn force_input() -> Self {
        Self {
            force_input: true,
            ..Self::default()
        }
    }

    fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(default) = &self.default {
            out.insert(String::from("default"), default.clone());
        }
        if let Some(tooltip) = &self.tooltip {
            out.insert(String::from("tooltip"), Value::String(tooltip.clone()));
        }
        if self.force_input {
            out.insert(String::from("forceInput"), Value::Bool(true));
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub io_type: IoType,
    pub section: InputSection,
    pub options: InputOptions,
}

impl InputSpec {
    pub fn new(
        section: InputSection,
        name: impl Into<String>,
        io_type: IoType,
        options: InputOptions,
    ) -> Self {
        Self {
            name: name.into(),
            io_type,
            section,
            options,
        }
    }

    pub fn hidden(name: impl Into<String>, io_type: IoType) -> Self {
        Self::new(InputSection::Hidden, name, io_type, InputOptions::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSchema {
    pub class_type: String,
    pub display_name: String,
    pub description: String,
    pub category: String,
    pub function: String,
    pub output_node: bool,
    pub return_types: Vec<IoType>,
    pub search_aliases: Vec<String>,
    pub inputs: Vec<InputSpec>,
}

impl NodeSchema {
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.class_type.trim().is_empty() {
            return Err(ContractError::EmptyClassType);
        }
        let mut seen = BTreeSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(ContractError::DuplicateInput {
                    class_type: self.class_type.clone(),
                    input: input.name.clone(),
                });
            }
            let hidden = matches!(input.section, InputSection::Hidden);
            if hidden != input.io_type.is_host_injected() {
                return Err(ContractError::MisplacedInput {
                    class_type: self.class_type.clone(),
                    input: input.name.clone(),
                    io_type: input.io_type,
                });
            }
        }
        Ok(())
    }

    pub fn inputs_in(&self, section: InputSection) -> impl Iterator<Item = &InputSpec> {
        self.inputs
            .iter()
            .filter(move |input| input.section == section)
    }

    /// Node description in the host's object-info shape.
    pub fn to_object_info(&self) -> Value {
        let mut input = Map::new();
        for section in [
            InputSection::Required,
            InputSection::Optional,
            InputSection::Hidden,
        ] {
            let mut fields = Map::new();
            for field in self.inputs_in(section) {
                let value = match section {
                    InputSection::Hidden => Value::String(field.io_type.as_str().to_string()),
                    InputSection::Required | InputSection::Optional => {
                        json!([field.io_type.as_str(), field.options.to_value()])
                    }
                };
                fields.insert(field.name.clone(), value);
            }
            if !fields.is_empty() {
                input.insert(section.as_str().to_string(), Value::Object(fields));
            }
        }

        let output: Vec<&str> = self.return_types.iter().map(|t| t.as_str()).collect();
        json!({
            "input": input,
            "output": output,
            "name": self.class_type,
            "display_name": self.display_name,
            "description": self.description,
            "category": self.category,
            "function": self.function,
            "output_node": self.output_node,
            "search_aliases": self.search_aliases,
        })
    }
}

pub fn object_info(schemas: &[NodeSchema]) -> Value {
    let mut out = Map::new();
    for schema in schemas {
        out.insert(schema.class_type.clone(), schema.to_object_info());
    }
    Value::Object(out)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("unsupported node IO type: {0}")]
    UnsupportedIoType(String),

    #[error("node class type must not be empty")]
    EmptyClassType,

    #[error("node '{class_type}' declares input '{input}' more than once")]
    DuplicateInput { class_type: String, input: String },

    #[error("node '{class_type}' input '{input}' of type {io_type} is in the wrong section")]
    MisplacedInput {
        class_type: String,
        input: String,
        io_type: IoType,
    },
}

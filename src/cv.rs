//! CV render input and its validation.

use serde::{Deserialize, Serialize};

pub const MAX_LIST_ENTRIES: usize = 50;
pub const MAX_FIELD_CHARS: usize = 5000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CvTemplate {
    #[default]
    Classic,
    Compact,
}

/// Everything the renderer needs to lay out one CV.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCvData {
    #[serde(default)]
    pub template: CvTemplate,
    pub personal: PersonalInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationEntry {
    #[serde(default)]
    pub institution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// Field-level validation failures, collected rather than short-circuited.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid CV data: {}", .problems.join("; "))]
pub struct ValidationError {
    pub problems: Vec<String>,
}

impl ExportCvData {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut problems = Vec::new();

        if self.personal.full_name.trim().is_empty() {
            problems.push("personal.fullName is required".to_string());
        }
        let email = self.personal.email.trim();
        if email.is_empty() {
            problems.push("personal.email is required".to_string());
        } else if !email.contains('@') {
            problems.push("personal.email is not a valid address".to_string());
        }

        for (i, entry) in self.experience.iter().enumerate() {
            if entry.title.trim().is_empty() {
                problems.push(format!("experience[{i}].title is required"));
            }
            if entry.company.trim().is_empty() {
                problems.push(format!("experience[{i}].company is required"));
            }
        }
        for (i, entry) in self.education.iter().enumerate() {
            if entry.institution.trim().is_empty() {
                problems.push(format!("education[{i}].institution is required"));
            }
        }

        check_len(&mut problems, "experience", self.experience.len());
        check_len(&mut problems, "education", self.education.len());
        check_len(&mut problems, "skills", self.skills.len());
        check_len(&mut problems, "languages", self.languages.len());

        for (field, text) in self.text_fields() {
            if text.chars().count() > MAX_FIELD_CHARS {
                problems.push(format!("{field} exceeds {MAX_FIELD_CHARS} characters"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { problems })
        }
    }

    fn text_fields(&self) -> Vec<(String, &str)> {
        let p = &self.personal;
        let mut fields: Vec<(String, &str)> = vec![
            ("personal.fullName".into(), p.full_name.as_str()),
            ("personal.email".into(), p.email.as_str()),
        ];
        let optional = [
            ("personal.headline", &p.headline),
            ("personal.phone", &p.phone),
            ("personal.location", &p.location),
            ("personal.website", &p.website),
            ("summary", &self.summary),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, v)| v.as_deref().map(|s| (name.to_string(), s))),
        );
        for (i, e) in self.experience.iter().enumerate() {
            fields.push((format!("experience[{i}].title"), e.title.as_str()));
            fields.push((format!("experience[{i}].company"), e.company.as_str()));
            let optional = [
                ("startDate", &e.start_date),
                ("endDate", &e.end_date),
                ("description", &e.description),
            ];
            for (name, v) in optional {
                if let Some(s) = v.as_deref() {
                    fields.push((format!("experience[{i}].{name}"), s));
                }
            }
        }
        for (i, e) in self.education.iter().enumerate() {
            fields.push((format!("education[{i}].institution"), e.institution.as_str()));
            let optional = [
                ("degree", &e.degree),
                ("startDate", &e.start_date),
                ("endDate", &e.end_date),
            ];
            for (name, v) in optional {
                if let Some(s) = v.as_deref() {
                    fields.push((format!("education[{i}].{name}"), s));
                }
            }
        }
        for (i, s) in self.skills.iter().enumerate() {
            fields.push((format!("skills[{i}]"), s.as_str()));
        }
        for (i, s) in self.languages.iter().enumerate() {
            fields.push((format!("languages[{i}]"), s.as_str()));
        }
        fields
    }
}

fn check_len(problems: &mut Vec<String>, field: &str, len: usize) {
    if len > MAX_LIST_ENTRIES {
        problems.push(format!("{field} has more than {MAX_LIST_ENTRIES} entries"));
    }
}

#[cfg(test)]
pub(crate) fn sample_cv() -> ExportCvData {
    ExportCvData {
        template: CvTemplate::Classic,
        personal: PersonalInfo {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            headline: Some("Analytical Engine Programmer".into()),
            phone: None,
            location: Some("London".into()),
            website: None,
        },
        summary: Some("Wrote the first published algorithm for a machine.".into()),
        experience: vec![ExperienceEntry {
            title: "Collaborator".into(),
            company: "Babbage & Co".into(),
            start_date: Some("1842".into()),
            end_date: Some("1843".into()),
            description: Some("Translated and annotated Menabrea's memoir.".into()),
        }],
        education: vec![],
        skills: vec!["Mathematics".into(), "Notes".into()],
        languages: vec!["English".into(), "French".into()],
    }
}

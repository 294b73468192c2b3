use alumline_core::error::GatewayError;
use alumline_core::executor::DomainGateway;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;

/// The shared named-tool surface, backed by the alumni domain tables.
/// Whatever transport drives the conversation — carrier webhook, browser
/// voice session, third-party agent platform — goes through these same
/// tools.
#[derive(Clone)]
pub struct PgDomainGateway {
    db: PgPool,
}

impl PgDomainGateway {
    pub fn new(db: PgPool) -> Self {
        PgDomainGateway { db }
    }
}

impl DomainGateway for PgDomainGateway {
    async fn invoke(&self, tool_name: &str, parameters: Value) -> Result<Value, GatewayError> {
        match tool_name {
            "find_mentors" => self.find_mentors(&parameters).await,
            "update_skills" => self.update_skills(&parameters).await,
            "check_opportunities" => self.check_opportunities().await,
            "check_events" => self.check_events().await,
            "schedule_mentorship" => self.schedule_mentorship(&parameters).await,
            "send_message" => self.send_message(&parameters).await,
            "rsvp_event" => self.rsvp_event(&parameters).await,
            "get_profile" => self.get_profile(&parameters).await,
            other => {
                tracing::warn!(tool = other, "invoke of a tool outside the surface");
                Err(GatewayError::Forbidden)
            }
        }
    }

    async fn create_post(&self, user_id: Uuid, content: &str) -> Result<Value, GatewayError> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO posts (id, author_id, content) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(user_id)
            .bind(content)
            .execute(&self.db)
            .await
            .map_err(transient)?;
        Ok(json!({ "id": id }))
    }
}

impl PgDomainGateway {
    async fn find_mentors(&self, params: &Value) -> Result<Value, GatewayError> {
        let skill_area = param_str(params, "skill_area");
        let rows = sqlx::query_as::<_, MentorRow>(
            r#"
            SELECT id, full_name, designation, company, skills
            FROM profiles
            WHERE is_mentor = TRUE
              AND ($1::text IS NULL
                   OR EXISTS (SELECT 1 FROM unnest(skills) AS s WHERE s ILIKE '%' || $1 || '%')
                   OR designation ILIKE '%' || $1 || '%')
            ORDER BY full_name
            LIMIT 5
            "#,
        )
        .bind(skill_area)
        .fetch_all(&self.db)
        .await
        .map_err(transient)?;

        let mentors: Vec<Value> = rows
            .into_iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "name": r.full_name,
                    "designation": r.designation,
                    "company": r.company,
                    "skills": r.skills,
                })
            })
            .collect();
        Ok(json!({ "mentors": mentors }))
    }

    async fn update_skills(&self, params: &Value) -> Result<Value, GatewayError> {
        let user_id = acting_user(params)?;
        let new_skills = param_str_vec(params, "new_skills");
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET skills = ARRAY(SELECT DISTINCT s FROM unnest(skills || $2::text[]) AS s)
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(&new_skills)
        .execute(&self.db)
        .await
        .map_err(transient)?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::Unauthorized);
        }
        Ok(json!({ "updated": true, "skills_added": new_skills }))
    }

    async fn check_opportunities(&self) -> Result<Value, GatewayError> {
        let rows = sqlx::query_as::<_, OpportunityRow>(
            r#"
            SELECT id, title, company
            FROM opportunities
            WHERE is_open = TRUE
            ORDER BY posted_at DESC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(transient)?;

        let opportunities: Vec<Value> = rows
            .into_iter()
            .map(|r| json!({ "id": r.id, "title": r.title, "company": r.company }))
            .collect();
        Ok(json!({ "opportunities": opportunities }))
    }

    async fn check_events(&self) -> Result<Value, GatewayError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, title, starts_at
            FROM events
            WHERE starts_at > now()
            ORDER BY starts_at ASC
            LIMIT 10
            "#,
        )
        .fetch_all(&self.db)
        .await
        .map_err(transient)?;

        let events: Vec<Value> = rows
            .into_iter()
            .map(|r| {
                json!({
                    "id": r.id,
                    "title": r.title,
                    // Spoken rendering; TTS reads this verbatim.
                    "date": r.starts_at.format("%A, %B %e at %l:%M %p").to_string(),
                })
            })
            .collect();
        Ok(json!({ "events": events }))
    }

    async fn schedule_mentorship(&self, params: &Value) -> Result<Value, GatewayError> {
        let user_id = acting_user(params)?;
        let mentor_name = param_str(params, "mentor_name").unwrap_or_default().to_string();
        let mentor_id = match param_uuid(params, "mentor_id") {
            Some(id) => Some(id),
            // Name-only fallback from the classifier: let the directory try.
            None => {
                sqlx::query_as::<_, (Uuid,)>(
                    "SELECT id FROM profiles WHERE is_mentor = TRUE AND full_name ILIKE '%' || $1 || '%' LIMIT 1",
                )
                .bind(&mentor_name)
                .fetch_optional(&self.db)
                .await
                .map_err(transient)?
                .map(|(id,)| id)
            }
        };
        let preferred_time = param_str(params, "preferred_time").unwrap_or_default();

        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO mentorship_sessions
                (id, mentee_id, mentor_id, mentor_name, preferred_time, status)
            VALUES ($1, $2, $3, $4, $5, 'requested')
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(mentor_id)
        .bind(&mentor_name)
        .bind(preferred_time)
        .execute(&self.db)
        .await
        .map_err(transient)?;

        Ok(json!({ "id": id, "status": "requested" }))
    }

    async fn send_message(&self, params: &Value) -> Result<Value, GatewayError> {
        let user_id = acting_user(params)?;
        let recipient_name = param_str(params, "recipient_name").unwrap_or_default().to_string();
        let body = param_str(params, "message").unwrap_or_default();

        let recipient_id = sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM profiles WHERE full_name ILIKE '%' || $1 || '%' LIMIT 1",
        )
        .bind(&recipient_name)
        .fetch_optional(&self.db)
        .await
        .map_err(transient)?
        .map(|(id,)| id);

        let id = Uuid::now_v7();
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, recipient_id, recipient_name, body)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(recipient_id)
        .bind(&recipient_name)
        .bind(body)
        .execute(&self.db)
        .await
        .map_err(transient)?;

        Ok(json!({ "id": id, "delivered": recipient_id.is_some() }))
    }

    async fn rsvp_event(&self, params: &Value) -> Result<Value, GatewayError> {
        let user_id = acting_user(params)?;
        let Some(event_id) = param_uuid(params, "event_id") else {
            return Err(GatewayError::Transient("rsvp without event_id".into()));
        };
        sqlx::query(
            "INSERT INTO event_rsvps (event_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(event_id)
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(transient)?;
        Ok(json!({ "registered": true, "event_id": event_id }))
    }

    async fn get_profile(&self, params: &Value) -> Result<Value, GatewayError> {
        // No acting user means no authenticated context to read a profile
        // from — the engine resolves ids before calling in the phone flow.
        let user_id = acting_user(params)?;
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT id, full_name, skills FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(transient)?;

        match row {
            Some(r) => Ok(json!({ "id": r.id, "name": r.full_name, "skills": r.skills })),
            None => Err(GatewayError::Unauthorized),
        }
    }
}

fn transient(err: sqlx::Error) -> GatewayError {
    GatewayError::Transient(err.to_string())
}

fn acting_user(params: &Value) -> Result<Uuid, GatewayError> {
    param_uuid(params, "user_id").ok_or(GatewayError::Unauthorized)
}

fn param_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn param_uuid(params: &Value, key: &str) -> Option<Uuid> {
    param_str(params, key).and_then(|s| Uuid::parse_str(s).ok())
}

fn param_str_vec(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(sqlx::FromRow)]
struct MentorRow {
    id: Uuid,
    full_name: String,
    designation: Option<String>,
    company: Option<String>,
    skills: Vec<String>,
}

#[derive(sqlx::FromRow)]
struct OpportunityRow {
    id: Uuid,
    title: String,
    company: Option<String>,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    starts_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    id: Uuid,
    full_name: String,
    skills: Vec<String>,
}

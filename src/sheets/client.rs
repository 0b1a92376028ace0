use super::formatting::{overview_rules, plan_rules};
use super::ranges::{chunk_rows, sanitize_rows, sanitize_sheet_title, whole_sheet_range};
use super::template::{OVERVIEW_SHEET, overview_rows};
use super::{CreatedPlanSheet, DeleteOutcome, PlanSheets, SheetTab, SpreadsheetRef};
use crate::config::SheetsConfig;
use crate::error::{AppError, Result};
use crate::http::{RequestEngine, RequestOptions, to_body};
use crate::storage::{self, KeyValueStore, keys};
use async_trait::async_trait;
use chrono::Local;
use google_drive3::api::File;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, BatchUpdateSpreadsheetResponse,
    DeleteSheetRequest, GridProperties, Request, Sheet, SheetProperties, Spreadsheet,
    SpreadsheetProperties, UpdateValuesResponse, ValueRange,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

// Name of the master spreadsheet file in Google Drive.
const SPREADSHEET_NAME: &str = "Account Plans";

const GRID_ROWS: i32 = 1000;
const GRID_COLUMNS: i32 = 26;

/// Browser link to a spreadsheet, optionally focused on one tab.
pub fn spreadsheet_link(spreadsheet_id: &str, gid: Option<i32>) -> String {
    match gid {
        Some(gid) => format!(
            "https://docs.google.com/spreadsheets/d/{}/edit#gid={}",
            spreadsheet_id, gid
        ),
        None => format!("https://docs.google.com/spreadsheets/d/{}/edit", spreadsheet_id),
    }
}

fn grid(rows: i32) -> Option<GridProperties> {
    Some(GridProperties {
        row_count: Some(rows),
        column_count: Some(GRID_COLUMNS),
        ..Default::default()
    })
}

/// Account plan operations against the Sheets and Drive REST APIs.
pub struct SheetsService {
    engine: RequestEngine,
    store: Arc<dyn KeyValueStore>,
    api_base_url: Url,
    drive_base_url: Url,
}

impl SheetsService {
    pub fn new(
        engine: RequestEngine,
        store: Arc<dyn KeyValueStore>,
        config: &SheetsConfig,
    ) -> Result<Self> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| AppError::Config(format!("Invalid URL '{}': {}", raw, e)))
        };

        Ok(Self {
            engine,
            store,
            api_base_url: parse(&config.api_base_url)?,
            drive_base_url: parse(&config.drive_base_url)?,
        })
    }

    fn endpoint<I>(base: &Url, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("Cannot use '{}' as a base URL", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn spreadsheet_url(&self, segments: &[&str]) -> Result<Url> {
        let segments = std::iter::once("spreadsheets").chain(segments.iter().copied());
        Self::endpoint(&self.api_base_url, segments)
    }

    fn values_url(&self, spreadsheet_id: &str, range: &str) -> Result<Url> {
        self.spreadsheet_url(&[spreadsheet_id, "values", range])
    }

    async fn verify_spreadsheet(&self, spreadsheet_id: &str) -> Result<()> {
        let mut url = self.spreadsheet_url(&[spreadsheet_id])?;
        url.query_pairs_mut()
            .append_pair("fields", "spreadsheetId,spreadsheetUrl");

        let metadata: Spreadsheet = self
            .engine
            .request(url.as_str(), RequestOptions::get())
            .await?
            .decode()?;

        match metadata.spreadsheet_id.as_deref() {
            Some(id) if id == spreadsheet_id => Ok(()),
            _ => Err(AppError::NotFound(format!(
                "Spreadsheet {} did not identify itself",
                spreadsheet_id
            ))),
        }
    }

    #[instrument(name = "Creating master spreadsheet", skip_all)]
    async fn create_master_spreadsheet(&self) -> Result<SpreadsheetRef> {
        let spreadsheet = Spreadsheet {
            properties: Some(SpreadsheetProperties {
                title: Some(SPREADSHEET_NAME.to_string()),
                ..Default::default()
            }),
            sheets: Some(vec![Sheet {
                properties: Some(SheetProperties {
                    title: Some(OVERVIEW_SHEET.to_string()),
                    grid_properties: grid(GRID_ROWS),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let url = self.spreadsheet_url(&[])?;
        let created: Spreadsheet = self
            .engine
            .request(url.as_str(), RequestOptions::post(to_body(&spreadsheet)?))
            .await?
            .decode()?;

        let id = created
            .spreadsheet_id
            .ok_or_else(|| AppError::Other("Created spreadsheet has empty ID".to_string()))?;
        let master = SpreadsheetRef {
            url: created
                .spreadsheet_url
                .unwrap_or_else(|| spreadsheet_link(&id, None)),
            id,
        };

        // Persist before anything else can fail so a retry reuses this file
        storage::save(self.store.as_ref(), keys::MASTER_SHEET, &master).await?;
        info!(id = %master.id, "Created master spreadsheet");

        let today = Local::now().date_naive();
        self.update_sheet_data(&master.id, OVERVIEW_SHEET, &overview_rows(&[], today))
            .await?;
        self.apply_overview_formatting(&master.id).await;

        Ok(master)
    }

    async fn sheet_tabs(&self, spreadsheet_id: &str, force_refresh: bool) -> Result<Vec<SheetTab>> {
        let mut url = self.spreadsheet_url(&[spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let mut options = RequestOptions::get();
        if force_refresh {
            options = options.force_refresh();
        }

        let spreadsheet: Spreadsheet = self.engine.request(url.as_str(), options).await?.decode()?;

        Ok(spreadsheet
            .sheets
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sheet| {
                let properties = sheet.properties?;
                Some(SheetTab {
                    title: properties.title?,
                    gid: properties.sheet_id?,
                })
            })
            .collect())
    }

    async fn batch_update(
        &self,
        spreadsheet_id: &str,
        requests: Vec<Request>,
    ) -> Result<BatchUpdateSpreadsheetResponse> {
        let batch_update = BatchUpdateSpreadsheetRequest {
            requests: Some(requests),
            ..Default::default()
        };
        let segment = format!("{}:batchUpdate", spreadsheet_id);
        let url = self.spreadsheet_url(&[segment.as_str()])?;

        let response = self
            .engine
            .request(url.as_str(), RequestOptions::post(to_body(&batch_update)?))
            .await?
            .decode()?;

        // Tab listings for this spreadsheet are now stale
        let prefix = self.spreadsheet_url(&[spreadsheet_id])?;
        self.engine.invalidate_prefix(prefix.as_str());

        Ok(response)
    }

    async fn clear_range(&self, spreadsheet_id: &str, range: &str) -> Result<()> {
        let url = self.values_url(spreadsheet_id, &format!("{}:clear", range))?;
        self.engine
            .request(url.as_str(), RequestOptions::post(json!({})))
            .await?;
        Ok(())
    }

    async fn try_overview_formatting(&self, spreadsheet_id: &str) -> Result<()> {
        let tabs = self.sheet_tabs(spreadsheet_id, false).await?;
        let overview = tabs
            .iter()
            .find(|tab| tab.title == OVERVIEW_SHEET)
            .ok_or_else(|| AppError::NotFound(format!("No '{}' sheet", OVERVIEW_SHEET)))?;
        let plan_count = tabs.len() - 1;

        self.batch_update(spreadsheet_id, overview_rules(overview.gid, plan_count))
            .await?;
        Ok(())
    }

    async fn try_refresh_overview(&self, spreadsheet_id: &str) -> Result<()> {
        let names: Vec<String> = self
            .list_plan_sheets(spreadsheet_id, true)
            .await?
            .into_iter()
            .map(|tab| tab.title)
            .collect();

        self.clear_range(spreadsheet_id, &whole_sheet_range(OVERVIEW_SHEET))
            .await?;
        let today = Local::now().date_naive();
        self.update_sheet_data(spreadsheet_id, OVERVIEW_SHEET, &overview_rows(&names, today))
            .await?;
        self.apply_overview_formatting(spreadsheet_id).await;

        debug!(plans = names.len(), "Rewrote overview");
        Ok(())
    }
}

#[async_trait]
impl PlanSheets for SheetsService {
    #[instrument(name = "Resolving master spreadsheet", skip_all)]
    async fn get_or_create_master_spreadsheet(&self) -> Result<SpreadsheetRef> {
        let stored =
            storage::load::<SpreadsheetRef>(self.store.as_ref(), keys::MASTER_SHEET).await?;

        if let Some(master) = stored {
            match self.verify_spreadsheet(&master.id).await {
                Ok(()) => {
                    debug!(id = %master.id, "Reusing master spreadsheet");
                    return Ok(master);
                }
                // A flaky network is not evidence that the file is gone
                Err(e) if e.kind().is_transient() => return Err(e),
                Err(e) => {
                    warn!(id = %master.id, error = %e, "Master spreadsheet is not accessible, creating a new one");
                }
            }
        }

        self.create_master_spreadsheet().await
    }

    #[instrument(name = "Adding account plan sheet", skip(self))]
    async fn create_account_plan_sheet(
        &self,
        account_name: &str,
        current_tab: Option<&str>,
    ) -> Result<CreatedPlanSheet> {
        let title = sanitize_sheet_title(account_name)?;
        let master = self.get_or_create_master_spreadsheet().await?;

        let tabs = self.sheet_tabs(&master.id, true).await?;
        if tabs.iter().any(|tab| tab.title == title) {
            return Err(AppError::Conflict(format!(
                "An account plan named '{}' already exists",
                title
            )));
        }

        let request = Request {
            add_sheet: Some(AddSheetRequest {
                properties: Some(SheetProperties {
                    title: Some(title.clone()),
                    sheet_type: Some("GRID".to_string()),
                    grid_properties: grid(100),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };

        let response = self.batch_update(&master.id, vec![request]).await?;
        let sheet_gid = response
            .replies
            .and_then(|replies| replies.into_iter().next())
            .and_then(|reply| reply.add_sheet)
            .and_then(|add_sheet| add_sheet.properties)
            .and_then(|properties| properties.sheet_id)
            .ok_or_else(|| {
                AppError::Other("Failed to get sheet ID from add sheet response".to_string())
            })?;

        let is_inline_navigation = current_tab.is_some_and(|tab| tab.contains(&master.id));
        info!(sheet_gid, %title, "Added account plan sheet");

        Ok(CreatedPlanSheet {
            spreadsheet_url: spreadsheet_link(&master.id, Some(sheet_gid)),
            spreadsheet_id: master.id,
            sheet_title: title,
            sheet_gid,
            is_inline_navigation,
        })
    }

    #[instrument(name = "Writing sheet", skip(self, rows), fields(rows = rows.len()))]
    async fn update_sheet_data(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        rows: &[Vec<Value>],
    ) -> Result<UpdateValuesResponse> {
        let rows = sanitize_rows(rows);
        let chunks = chunk_rows(sheet_name, &rows);
        if chunks.len() > 1 {
            debug!(chunks = chunks.len(), "Splitting write into chunks");
        }

        let mut last = UpdateValuesResponse::default();
        for chunk in chunks {
            let value_range = ValueRange {
                major_dimension: Some("ROWS".to_string()),
                range: Some(chunk.range.clone()),
                values: Some(chunk.rows.to_vec()),
            };

            let mut url = self.values_url(spreadsheet_id, &chunk.range)?;
            url.query_pairs_mut()
                .append_pair("valueInputOption", "USER_ENTERED");

            last = self
                .engine
                .request(url.as_str(), RequestOptions::put(to_body(&value_range)?))
                .await?
                .decode()?;
        }

        Ok(last)
    }

    async fn apply_overview_formatting(&self, spreadsheet_id: &str) {
        if let Err(e) = self.try_overview_formatting(spreadsheet_id).await {
            warn!(error = %e, "Failed to format overview sheet");
        }
    }

    async fn apply_plan_formatting(&self, spreadsheet_id: &str, sheet_gid: i32) {
        if let Err(e) = self.batch_update(spreadsheet_id, plan_rules(sheet_gid)).await {
            warn!(sheet_gid, error = %e, "Failed to format account plan sheet");
        }
    }

    #[instrument(name = "Refreshing overview", skip(self))]
    async fn refresh_overview_content(&self, spreadsheet_id: &str) -> bool {
        match self.try_refresh_overview(spreadsheet_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to refresh overview");
                false
            }
        }
    }

    #[instrument(name = "Deleting account plan sheet", skip(self))]
    async fn delete_account_plan_sheet(
        &self,
        spreadsheet_id: &str,
        account_name: &str,
    ) -> Result<DeleteOutcome> {
        let sanitized = sanitize_sheet_title(account_name).ok();
        let tab = self
            .sheet_tabs(spreadsheet_id, true)
            .await?
            .into_iter()
            .find(|tab| tab.title == account_name || Some(&tab.title) == sanitized.as_ref())
            .ok_or_else(|| {
                AppError::NotFound(format!("No account plan named '{}'", account_name))
            })?;

        if tab.title == OVERVIEW_SHEET {
            return Err(AppError::Validation(format!(
                "The '{}' sheet cannot be deleted",
                OVERVIEW_SHEET
            )));
        }

        let request = Request {
            delete_sheet: Some(DeleteSheetRequest {
                sheet_id: Some(tab.gid),
            }),
            ..Default::default()
        };
        self.batch_update(spreadsheet_id, vec![request]).await?;
        info!(gid = tab.gid, title = %tab.title, "Deleted account plan sheet");

        let overview_updated = self.refresh_overview_content(spreadsheet_id).await;
        Ok(DeleteOutcome {
            success: true,
            overview_updated,
        })
    }

    async fn list_plan_sheets(
        &self,
        spreadsheet_id: &str,
        force_refresh: bool,
    ) -> Result<Vec<SheetTab>> {
        let mut tabs = self.sheet_tabs(spreadsheet_id, force_refresh).await?;
        tabs.retain(|tab| tab.title != OVERVIEW_SHEET);
        Ok(tabs)
    }

    #[instrument(name = "Copying template", skip(self))]
    async fn copy_template(&self, template_id: &str, name: &str) -> Result<SpreadsheetRef> {
        let title = sanitize_sheet_title(name)?;
        let mut url = Self::endpoint(&self.drive_base_url, &["files", template_id, "copy"])?;
        url.query_pairs_mut().append_pair("fields", "id,name,webViewLink");

        let file = File {
            name: Some(title),
            ..Default::default()
        };
        let copied: File = self
            .engine
            .request(url.as_str(), RequestOptions::post(to_body(&file)?))
            .await?
            .decode()?;

        let id = copied
            .id
            .ok_or_else(|| AppError::Other("Copied file has empty ID".to_string()))?;
        info!(%id, "Copied template");

        Ok(SpreadsheetRef {
            url: copied
                .web_view_link
                .unwrap_or_else(|| spreadsheet_link(&id, None)),
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_helpers::{TestEngine, test_engine};
    use crate::storage::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> (SheetsService, Arc<MemoryStore>, TestEngine) {
        let t = test_engine();
        let store = Arc::new(MemoryStore::new());
        let config = SheetsConfig {
            api_base_url: server.uri(),
            drive_base_url: format!("{}/drive/v3", server.uri()),
            template_id: None,
        };
        let service = SheetsService::new(t.engine.clone(), store.clone(), &config).unwrap();
        (service, store, t)
    }

    fn tabs(titles: &[(&str, i32)]) -> Value {
        let sheets: Vec<Value> = titles
            .iter()
            .map(|(title, gid)| json!({"properties": {"title": title, "sheetId": gid}}))
            .collect();
        json!({ "sheets": sheets })
    }

    async fn store_master(store: &MemoryStore, id: &str) {
        let master = SpreadsheetRef {
            id: id.to_string(),
            url: spreadsheet_link(id, None),
        };
        storage::save(store, keys::MASTER_SHEET, &master).await.unwrap();
    }

    async fn mount_verify(server: &MockServer, id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/spreadsheets/{}", id)))
            .and(query_param("fields", "spreadsheetId,spreadsheetUrl"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"spreadsheetId": id})))
            .mount(server)
            .await;
    }

    async fn mount_writes(server: &MockServer) {
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updatedCells": 1})))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":clear$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fresh_install_creates_master_then_adds_tab() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spreadsheetId": "master-1",
                "spreadsheetUrl": "https://docs.google.com/spreadsheets/d/master-1/edit",
                "sheets": [{"properties": {"title": "Overview", "sheetId": 0}}],
            })))
            .expect(1)
            .mount(&server)
            .await;
        mount_verify(&server, "master-1").await;
        Mock::given(method("GET"))
            .and(path("/spreadsheets/master-1"))
            .and(query_param("fields", "sheets.properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tabs(&[("Overview", 0)])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/master-1:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "replies": [{"addSheet": {"properties": {"title": "Acme Inc.", "sheetId": 4242}}}]
            })))
            .mount(&server)
            .await;
        mount_writes(&server).await;

        let (service, store, _t) = service(&server);
        let created = service
            .create_account_plan_sheet("Acme Inc.", None)
            .await
            .unwrap();

        assert_eq!(created.spreadsheet_id, "master-1");
        assert_eq!(created.sheet_gid, 4242);
        assert_eq!(created.sheet_title, "Acme Inc.");
        assert!(created.spreadsheet_url.ends_with("#gid=4242"));
        assert!(!created.is_inline_navigation);

        let master: SpreadsheetRef = storage::load(store.as_ref(), keys::MASTER_SHEET)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(master.id, "master-1");

        let requests = server.received_requests().await.unwrap();
        let create = requests
            .iter()
            .find(|r| r.method.as_str() == "POST" && r.url.path() == "/spreadsheets")
            .unwrap();
        let body: Value = serde_json::from_slice(&create.body).unwrap();
        assert_eq!(body["properties"]["title"], "Account Plans");
        assert_eq!(body["sheets"][0]["properties"]["title"], "Overview");

        let overview_write = requests
            .iter()
            .find(|r| r.method.as_str() == "PUT")
            .unwrap();
        assert_eq!(overview_write.url.query(), Some("valueInputOption=USER_ENTERED"));
        let body: Value = serde_json::from_slice(&overview_write.body).unwrap();
        assert_eq!(body["majorDimension"], "ROWS");
        assert_eq!(body["range"], "'Overview'!A1:E2");
    }

    #[tokio::test]
    async fn test_existing_master_is_reused() {
        let server = MockServer::start().await;
        mount_verify(&server, "master-1").await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (service, store, _t) = service(&server);
        store_master(&store, "master-1").await;

        let first = service.get_or_create_master_spreadsheet().await.unwrap();
        let second = service.get_or_create_master_spreadsheet().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.id, "master-1");
    }

    #[tokio::test]
    async fn test_transient_verify_failure_does_not_create_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (service, store, _t) = service(&server);
        store_master(&store, "master-1").await;

        let err = service.get_or_create_master_spreadsheet().await.unwrap_err();
        assert!(matches!(err, AppError::Server(_)));
    }

    #[tokio::test]
    async fn test_second_create_with_same_name_conflicts() {
        let server = MockServer::start().await;
        mount_verify(&server, "master-1").await;
        Mock::given(method("GET"))
            .and(query_param("fields", "sheets.properties"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tabs(&[("Overview", 0)])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("fields", "sheets.properties"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tabs(&[("Overview", 0), ("Acme", 77)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/master-1:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "replies": [{"addSheet": {"properties": {"title": "Acme", "sheetId": 77}}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (service, store, _t) = service(&server);
        store_master(&store, "master-1").await;

        let current_tab = "https://docs.google.com/spreadsheets/d/master-1/edit#gid=0";
        let created = service
            .create_account_plan_sheet("Acme", Some(current_tab))
            .await
            .unwrap();
        assert!(created.is_inline_navigation);

        let err = service
            .create_account_plan_sheet("Acme", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_large_write_is_chunked() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/spreadsheets/sheet-1/values/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"updatedCells": 1})))
            .expect(2)
            .mount(&server)
            .await;

        let (service, _store, _t) = service(&server);
        let rows: Vec<Vec<Value>> = (0..1500).map(|i| vec![json!(i)]).collect();
        service
            .update_sheet_data("sheet-1", "Plan", &rows)
            .await
            .unwrap();

        let mut written = Vec::new();
        let mut ranges = Vec::new();
        for request in server.received_requests().await.unwrap() {
            let body: Value = serde_json::from_slice(&request.body).unwrap();
            ranges.push(body["range"].as_str().unwrap().to_string());
            written.extend(body["values"].as_array().unwrap().iter().cloned());
        }

        assert_eq!(ranges, vec!["'Plan'!A1:A1000", "'Plan'!A1001:A1500"]);
        let expected: Vec<Value> = rows.into_iter().map(Value::from).collect();
        assert_eq!(written, expected);
    }

    #[tokio::test]
    async fn test_delete_reports_overview_failure_softly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("fields", "sheets.properties"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(tabs(&[("Overview", 0), ("Acme", 77)])),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/spreadsheets/master-1:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"replies": [{}]})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex(r":clear$"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"message": "Unable to parse range"}
            })))
            .mount(&server)
            .await;

        let (service, _store, _t) = service(&server);
        let outcome = service
            .delete_account_plan_sheet("master-1", "Acme")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DeleteOutcome {
                success: true,
                overview_updated: false
            }
        );

        let requests = server.received_requests().await.unwrap();
        let delete = requests
            .iter()
            .find(|r| r.url.path().ends_with(":batchUpdate"))
            .unwrap();
        let body: Value = serde_json::from_slice(&delete.body).unwrap();
        assert_eq!(body["requests"][0]["deleteSheet"]["sheetId"], 77);
    }

    #[tokio::test]
    async fn test_delete_missing_tab_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tabs(&[("Overview", 0)])))
            .mount(&server)
            .await;

        let (service, _store, _t) = service(&server);
        let err = service
            .delete_account_plan_sheet("master-1", "Globex")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = service
            .delete_account_plan_sheet("master-1", "Overview")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_copy_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/drive/v3/files/template-9/copy"))
            .and(query_param("fields", "id,name,webViewLink"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "copy-1",
                "name": "Acme Inc.",
                "webViewLink": "https://docs.google.com/spreadsheets/d/copy-1/edit"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (service, _store, _t) = service(&server);
        let copied = service
            .copy_template("template-9", "Acme Inc.")
            .await
            .unwrap();

        assert_eq!(copied.id, "copy-1");
        let request = &server.received_requests().await.unwrap()[0];
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body, json!({"name": "Acme Inc."}));
    }
}

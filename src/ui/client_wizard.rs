use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use tui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Span, Spans},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::models::{Category, Client, NewClient};
use crate::ui::{category_color, cycle_year, POLL_INTERVAL};

pub enum ClientWizardAction {
    Cancel,
    Save(NewClient),
}

#[derive(Clone, PartialEq, Copy, Debug)]
pub enum ClientField {
    Year,
    Category,
    LastName,
    FirstName,
    Phone,
}

impl ClientField {
    fn is_text(&self) -> bool {
        matches!(self, ClientField::LastName | ClientField::FirstName | ClientField::Phone)
    }
}

pub struct ClientWizardState {
    pub original: Option<Client>,
    pub draft: NewClient,
    pub current_field: ClientField,
    pub editing: bool,
    year_options: Vec<i32>,
    number_preview: Option<String>,
    preview_scope: Option<(i32, Category)>,
    error: Option<String>,
}

impl ClientWizardState {
    pub fn new(year: i32, year_options: Vec<i32>) -> Self {
        Self {
            original: None,
            draft: NewClient::new(year),
            current_field: ClientField::LastName,
            editing: false,
            year_options,
            number_preview: None,
            preview_scope: None,
            error: None,
        }
    }

    pub fn from_existing(client: Client, year_options: Vec<i32>) -> Self {
        Self {
            draft: NewClient::from_existing(&client),
            original: Some(client),
            current_field: ClientField::LastName,
            editing: false,
            year_options,
            number_preview: None,
            preview_scope: None,
            error: None,
        }
    }

    pub fn toggle_editing(&mut self) {
        if self.current_field.is_text() {
            self.editing = !self.editing;
        }
    }

    pub fn next_field(&mut self) {
        self.current_field = match self.current_field {
            ClientField::Year => ClientField::Category,
            ClientField::Category => ClientField::LastName,
            ClientField::LastName => ClientField::FirstName,
            ClientField::FirstName => ClientField::Phone,
            ClientField::Phone => ClientField::Year,
        };
    }

    pub fn previous_field(&mut self) {
        self.current_field = match self.current_field {
            ClientField::Year => ClientField::Phone,
            ClientField::Category => ClientField::Year,
            ClientField::LastName => ClientField::Category,
            ClientField::FirstName => ClientField::LastName,
            ClientField::Phone => ClientField::FirstName,
        };
    }

    /// Left/Right on the year and category pickers
    pub fn cycle_current_field(&mut self, forward: bool) {
        match self.current_field {
            ClientField::Year => {
                self.draft.year = cycle_year(&self.year_options, self.draft.year, forward);
            }
            ClientField::Category => {
                self.draft.category = if forward {
                    self.draft.category.next()
                } else {
                    self.draft.category.previous()
                };
            }
            ClientField::LastName | ClientField::FirstName | ClientField::Phone => {}
        }
    }

    pub fn edit_current_field(&mut self, key: KeyCode) {
        if !self.editing {
            return;
        }

        let field_value = match self.current_field {
            ClientField::LastName => &mut self.draft.last_name,
            ClientField::FirstName => &mut self.draft.first_name,
            ClientField::Phone => &mut self.draft.phone,
            ClientField::Year | ClientField::Category => return,
        };

        match key {
            KeyCode::Char(c) => {
                field_value.push(c);
            }
            KeyCode::Backspace => {
                field_value.pop();
            }
            _ => {}
        }
    }

    pub fn is_valid(&self) -> bool {
        self.draft.missing_field().is_none()
    }

    /// Scope the shown number belongs to, `None` while an edit keeps its number
    fn number_scope(&self) -> Option<(i32, Category)> {
        match &self.original {
            Some(client) if client.category == self.draft.category => None,
            _ => Some((self.draft.year, self.draft.category)),
        }
    }

    /// Scope whose number still has to be generated for the preview
    pub fn stale_number_scope(&self) -> Option<(i32, Category)> {
        let scope = self.number_scope()?;
        (self.preview_scope != Some(scope)).then_some(scope)
    }

    pub fn set_number_preview(&mut self, scope: (i32, Category), number: String) {
        self.preview_scope = Some(scope);
        self.number_preview = Some(number);
    }

    pub fn number_display(&self) -> String {
        match (self.number_scope(), &self.original) {
            (None, Some(client)) => client.client_number.clone(),
            (Some(scope), _) if self.preview_scope == Some(scope) => {
                self.number_preview.clone().unwrap_or_default()
            }
            _ => "...".to_string(),
        }
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }
}

pub fn render_client_wizard<B: Backend>(f: &mut Frame<B>, state: &mut ClientWizardState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(10),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(f.size());

    let title_text = if state.original.is_none() {
        "Add Client"
    } else {
        "Edit Client"
    };

    let title = Paragraph::new(title_text)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    let form_area = chunks[1];
    render_form(f, state, form_area);

    let help = match &state.error {
        Some(message) => Paragraph::new(message.as_str()).style(Style::default().fg(Color::Red)),
        None => {
            let help_text = if state.editing {
                "Enter - Save field | Esc - Cancel editing"
            } else {
                "Enter - Edit field | Left/Right - Change year or category | Up/Down - Navigate | S - Save | Esc - Cancel"
            };
            Paragraph::new(help_text).style(Style::default().fg(Color::Gray))
        }
    };
    f.render_widget(help.block(Block::default().borders(Borders::ALL)), chunks[2]);
}

fn render_form<B: Backend>(f: &mut Frame<B>, state: &mut ClientWizardState, area: Rect) {
    let fields = [
        (ClientField::Year, "Year", state.draft.year.to_string()),
        (ClientField::Category, "Category", state.draft.category.label().to_string()),
        (ClientField::LastName, "Last name *", state.draft.last_name.clone()),
        (ClientField::FirstName, "First name *", state.draft.first_name.clone()),
        (ClientField::Phone, "Phone *", state.draft.phone.clone()),
    ];

    let mut items: Vec<ListItem> = fields
        .iter()
        .map(|(field, name, value)| {
            let selected = *field == state.current_field;
            let label_style = if selected {
                Style::default().fg(Color::Yellow)
            } else {
                Style::default()
            };

            let value_span = if selected && state.editing {
                Span::styled(format!("{}|", value), Style::default().add_modifier(Modifier::BOLD))
            } else if *field == ClientField::Category {
                Span::styled(value.clone(), Style::default().fg(category_color(state.draft.category)))
            } else if selected && !field.is_text() {
                Span::raw(format!("< {} >", value))
            } else {
                Span::raw(value.clone())
            };

            ListItem::new(Spans::from(vec![
                Span::styled(format!("{}: ", name), label_style),
                value_span,
            ]))
        })
        .collect();

    items.push(ListItem::new(Spans::from(vec![
        Span::styled("Client number: ", Style::default().fg(Color::Gray)),
        Span::raw(state.number_display()),
    ])));

    let form_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Client Details"))
        .highlight_style(Style::default().fg(Color::Yellow));

    f.render_widget(form_list, area);
}

pub fn handle_input(state: &mut ClientWizardState) -> Result<Option<ClientWizardAction>> {
    if !event::poll(POLL_INTERVAL)? {
        return Ok(None);
    }

    if let Event::Key(key) = event::read()? {
        match key.code {
            KeyCode::Esc => {
                if state.editing {
                    state.toggle_editing();
                } else {
                    return Ok(Some(ClientWizardAction::Cancel));
                }
            }
            KeyCode::Enter => {
                state.toggle_editing();
            }
            KeyCode::Up if !state.editing => {
                state.previous_field();
            }
            KeyCode::Down if !state.editing => {
                state.next_field();
            }
            KeyCode::Left if !state.editing => {
                state.cycle_current_field(false);
            }
            KeyCode::Right if !state.editing => {
                state.cycle_current_field(true);
            }
            KeyCode::Char('s') if !state.editing => {
                if state.is_valid() {
                    return Ok(Some(ClientWizardAction::Save(state.draft.clone())));
                }
                state.set_error("Fill in every field marked * before saving");
            }
            _ if state.editing => {
                state.edit_current_field(key.code);
            }
            _ => {}
        }
    }

    Ok(None)
}
